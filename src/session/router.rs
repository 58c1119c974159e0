use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, trace};

use super::state::SessionStore;

/// A parsed inbound frame. Ephemeral: produced per frame, consumed
/// immediately by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Partial { en: Option<String>, tr: Option<String> },
    Final { en: Option<String>, tr: Option<String> },
    Error { text: String },
    Info { text: String },
    QuestionDetected { en: String },
    Unknown,
}

#[derive(Deserialize)]
struct RawInbound {
    #[serde(rename = "type")]
    kind: String,
    en: Option<String>,
    tr: Option<String>,
    text: Option<String>,
}

impl InboundMessage {
    /// Parse one frame. `None` means malformed or type-less JSON, which the
    /// caller must treat as if the frame never arrived: unknown backend
    /// protocol versions must not crash or corrupt state.
    pub fn parse(payload: &str) -> Option<Self> {
        let raw: RawInbound = serde_json::from_str(payload).ok()?;
        Some(match raw.kind.as_str() {
            // `text` doubles as the Turkish line on partials only.
            "partial" => InboundMessage::Partial {
                en: raw.en,
                tr: raw.tr.or(raw.text),
            },
            "final" => InboundMessage::Final {
                en: raw.en,
                tr: raw.tr,
            },
            "error" => InboundMessage::Error {
                text: raw.text.unwrap_or_else(|| "error".to_string()),
            },
            "info" => InboundMessage::Info {
                text: raw.text.unwrap_or_else(|| "info".to_string()),
            },
            // The backend emits `qa.question`; the flat name is accepted for
            // newer protocol revisions.
            "qa.question" | "question_detected" => match raw.en {
                Some(en) => InboundMessage::QuestionDetected { en },
                None => InboundMessage::Unknown,
            },
            _ => InboundMessage::Unknown,
        })
    }
}

/// Follow-up work the router cannot do itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterAction {
    /// A question was detected with auto-assist on; run an assistant
    /// exchange with no explicit question.
    TriggerAssist,
}

/// Applies inbound messages to the session state. The only component
/// allowed to mutate transcript fields.
pub struct MessageRouter {
    store: Arc<SessionStore>,
}

impl MessageRouter {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Parse and apply one raw frame.
    pub fn route_payload(&self, payload: &str) -> Option<RouterAction> {
        match InboundMessage::parse(payload) {
            Some(message) => self.route(message),
            None => {
                trace!("ignoring malformed inbound frame");
                None
            }
        }
    }

    pub fn route(&self, message: InboundMessage) -> Option<RouterAction> {
        match message {
            InboundMessage::Partial { en, tr } => {
                // Absent fields leave the previous partial standing.
                self.store.update(|s| {
                    if let Some(en) = en {
                        s.partial_en = en;
                    }
                    if let Some(tr) = tr {
                        s.partial_tr = tr;
                    }
                });
                None
            }
            InboundMessage::Final { en, tr } => {
                self.store.update(|s| {
                    if let Some(en) = en {
                        s.push_final_en(en);
                    }
                    if let Some(tr) = tr {
                        s.push_final_tr(tr);
                    }
                    // A final ends the utterance whatever the partials held.
                    s.partial_en.clear();
                    s.partial_tr.clear();
                });
                None
            }
            InboundMessage::Error { text } => {
                self.store.update(|s| s.push_final_en(format!("[error] {}", text)));
                None
            }
            InboundMessage::Info { text } => {
                self.store.update(|s| s.push_final_en(format!("[info] {}", text)));
                None
            }
            InboundMessage::QuestionDetected { en } => {
                let mut auto = false;
                self.store.update(|s| {
                    s.last_question_en = en;
                    auto = s.auto_assist;
                });
                if auto {
                    debug!("question detected, triggering assistant");
                    Some(RouterAction::TriggerAssist)
                } else {
                    None
                }
            }
            InboundMessage::Unknown => None,
        }
    }
}
