use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::session::SessionStore;

use super::client::BackendClient;
use super::messages::AskRequest;

/// Serializes assistant exchanges: at most one request in flight per
/// session. A second `ask` while one is pending is a no-op, not a queue.
pub struct AssistantClient {
    backend: Arc<BackendClient>,
    store: Arc<SessionStore>,
    in_flight: AtomicBool,
}

impl AssistantClient {
    pub fn new(backend: Arc<BackendClient>, store: Arc<SessionStore>) -> Self {
        Self {
            backend,
            store,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one exchange and publish the answer. The effective question is the
    /// explicit argument (trimmed, non-empty), else the last detected
    /// question, else empty. Never raises: failures become the answer text.
    pub async fn ask(&self, explicit: Option<String>) {
        if !self.backend.can_ask() {
            debug!("ask endpoint not configured, ignoring assistant request");
            return;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("assistant request already in flight, ignoring");
            return;
        }

        let (question, context_en, context_tr) = {
            let state = self.store.snapshot();
            (
                state.effective_question(explicit.as_deref()),
                state.context_en(),
                state.context_tr(),
            )
        };

        self.store.update(|s| s.drafting = true);
        info!(question = %question, "assistant request started");

        let answer = self
            .backend
            .ask(&AskRequest {
                question,
                context_en,
                context_tr,
                target: "en".to_string(),
            })
            .await;

        // Guard released on every path: `ask` itself never errors.
        self.store.update(|s| {
            s.assistant_answer = answer;
            s.drafting = false;
        });
        self.in_flight.store(false, Ordering::SeqCst);
        info!("assistant request finished");
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}
