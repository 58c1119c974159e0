use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::audio::{CaptureBackend, CaptureError, EncoderConfig, MicrophoneBackend, Pcm16Encoder, RawFrame};
use crate::backend::{AssistantClient, AudioDevice, BackendClient};
use crate::config::Config;
use crate::transport::{run_connection, OutboundFrame, StreamEvent, TransportConfig};

use super::reconnect::ReconnectPolicy;
use super::router::{MessageRouter, RouterAction};
use super::state::{ConnectionStatus, SessionState, SessionStore};

/// Encoded audio chunks buffered toward the transport. Sized for a couple of
/// seconds of audio; a reconnect window longer than that drops chunks.
const OUTBOUND_QUEUE: usize = 32;

/// Stream lifecycle events buffered toward the dispatcher.
const EVENT_QUEUE: usize = 64;

/// The realtime duplex session manager.
///
/// Owns the stream connection, the capture -> encode -> frame pipeline, the
/// reconnect policy and the published session state. The UI reads state via
/// `subscribe` and calls the public operations; it never touches the
/// internals.
pub struct SessionManager {
    config: Config,
    session_id: Uuid,
    store: Arc<SessionStore>,
    router: Arc<MessageRouter>,
    backend: Arc<BackendClient>,
    assistant: Arc<AssistantClient>,
    policy: Arc<ReconnectPolicy>,

    outbound_tx: Mutex<Option<mpsc::Sender<OutboundFrame>>>,
    capture: Mutex<Option<Box<dyn CaptureBackend>>>,
    pipeline: Mutex<Option<JoinHandle<()>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(config: Config) -> Result<Self> {
        let session_id = Uuid::new_v4();
        let store = Arc::new(SessionStore::new());
        let router = Arc::new(MessageRouter::new(Arc::clone(&store)));
        let backend = Arc::new(BackendClient::new(&config.backend)?);
        let assistant = Arc::new(AssistantClient::new(
            Arc::clone(&backend),
            Arc::clone(&store),
        ));
        let policy = Arc::new(ReconnectPolicy::new(Duration::from_millis(
            config.stream.reconnect_delay_ms,
        )));

        info!(session = %session_id, "session manager created");

        Ok(Self {
            config,
            session_id,
            store,
            router,
            backend,
            assistant,
            policy,
            outbound_tx: Mutex::new(None),
            capture: Mutex::new(None),
            pipeline: Mutex::new(None),
            supervisor: Mutex::new(None),
            dispatcher: Mutex::new(None),
        })
    }

    /// Observe published state. Every mutation notifies synchronously.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.store.snapshot()
    }

    /// Start the session: handshake, stream connection with automatic
    /// reconnects, and (unless disabled) microphone streaming.
    pub async fn connect(&self) -> Result<()> {
        let Some(stream_url) = self.config.backend.stream_url.clone() else {
            self.store.update(|s| {
                s.status_text = "stream endpoint not configured".to_string();
            });
            warn!("connect requested without a stream endpoint");
            return Ok(());
        };

        {
            let supervisor = self.supervisor.lock().await;
            if supervisor.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
                warn!("already connected");
                return Ok(());
            }
        }

        info!(session = %self.session_id, url = %stream_url, "connecting");
        self.policy.reset();
        self.store.update(|s| {
            s.status = ConnectionStatus::Connecting;
            s.status_text = "connecting".to_string();
        });

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);

        *self.dispatcher.lock().await = Some(self.spawn_dispatcher(events_rx));

        if self.config.audio.enabled {
            self.start_capture(outbound_tx.clone()).await;
        }

        *self.supervisor.lock().await = Some(self.spawn_supervisor(
            stream_url,
            outbound_rx,
            events_tx,
        ));
        *self.outbound_tx.lock().await = Some(outbound_tx);

        Ok(())
    }

    /// Stop everything: capture, keep-alive, the stream, and any pending
    /// reconnect. Idempotent; in-flight assistant requests are not cancelled,
    /// their result simply lands in state later.
    pub async fn disconnect(&self) {
        info!(session = %self.session_id, "disconnect requested");
        self.policy.stop();

        if let Some(mut capture) = self.capture.lock().await.take() {
            if let Err(e) = capture.stop().await {
                warn!("capture stop failed: {}", e);
            }
        }
        if let Some(handle) = self.pipeline.lock().await.take() {
            let _ = handle.await;
        }

        // Closing the outbound channel asks the transport for a clean
        // shutdown; the supervisor then observes the stop flag and exits.
        self.outbound_tx.lock().await.take();
        if let Some(handle) = self.supervisor.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.dispatcher.lock().await.take() {
            let _ = handle.await;
        }

        self.store.update(|s| {
            s.status = ConnectionStatus::Disconnected;
            s.status_text = "disconnected".to_string();
        });
    }

    /// Send a question to the assistant; `None` falls back to the last
    /// detected question. A call while one is pending is ignored.
    pub async fn ask(&self, question: Option<String>) {
        self.assistant.ask(question).await;
    }

    /// Drop accumulated transcript lines and the assistant panel.
    pub fn clear_history(&self) {
        self.store.update(|s| s.clear_history());
    }

    /// Fetch backend capture devices, auto-selecting the first (or the
    /// configured preference) when nothing is selected yet.
    pub async fn load_devices(&self) -> Result<Vec<AudioDevice>> {
        let devices = self.backend.list_devices().await?;
        let preferred = self.config.backend.device.clone();
        self.store.update(|s| {
            s.devices = devices.clone();
            if s.selected_device.is_none() {
                s.selected_device = preferred
                    .as_deref()
                    .and_then(|name| devices.iter().find(|d| d.name == name).cloned())
                    .or_else(|| devices.first().cloned());
            }
        });
        Ok(devices)
    }

    /// Select a backend device by name; takes effect at the next handshake.
    pub fn select_device(&self, name: &str) -> bool {
        let mut found = false;
        self.store.update(|s| {
            if let Some(device) = s.devices.iter().find(|d| d.name == name).cloned() {
                s.selected_device = Some(device);
                found = true;
            }
        });
        found
    }

    pub fn set_auto_assist(&self, enabled: bool) {
        self.store.update(|s| s.auto_assist = enabled);
    }

    /// Single dispatcher for stream lifecycle events; the only place inbound
    /// frames meet session state.
    fn spawn_dispatcher(&self, mut events_rx: mpsc::Receiver<StreamEvent>) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let router = Arc::clone(&self.router);
        let assistant = Arc::clone(&self.assistant);

        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                match event {
                    StreamEvent::Opened => {
                        store.update(|s| {
                            s.status = ConnectionStatus::Connected;
                            s.status_text = "connected".to_string();
                            s.stats.connections += 1;
                        });
                    }
                    StreamEvent::Message(payload) => {
                        if let Some(RouterAction::TriggerAssist) = router.route_payload(&payload) {
                            let assistant = Arc::clone(&assistant);
                            tokio::spawn(async move {
                                assistant.ask(None).await;
                            });
                        }
                    }
                    StreamEvent::Closed(reason) => {
                        store.update(|s| {
                            s.status = ConnectionStatus::Disconnected;
                            s.status_text = format!("stream closed: {}", reason);
                        });
                    }
                }
            }
            debug!("event dispatcher finished");
        })
    }

    /// Connection supervisor: handshake, one connection, and the fixed-delay
    /// reconnect loop, until the policy says stop.
    fn spawn_supervisor(
        &self,
        stream_url: String,
        mut outbound_rx: mpsc::Receiver<OutboundFrame>,
        events_tx: mpsc::Sender<StreamEvent>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let backend = Arc::clone(&self.backend);
        let policy = Arc::clone(&self.policy);
        let transport_config = TransportConfig {
            keepalive: Duration::from_secs(self.config.stream.keepalive_secs),
            wire_format: self.config.audio.wire_format,
        };
        let configured_device = self.config.backend.device.clone();

        tokio::spawn(async move {
            loop {
                if !policy.should_reconnect() {
                    break;
                }

                // The handshake renews server-side pipeline state; the
                // backend expires sessions on its own, so it runs before
                // every attempt. Failure is logged and the connect still
                // happens.
                let device = store
                    .snapshot()
                    .selected_device
                    .map(|d| d.name)
                    .or_else(|| configured_device.clone());
                if let Err(e) = backend.start_session(device.as_deref()).await {
                    warn!("session-start handshake failed: {}", e);
                    store.update(|s| {
                        s.status_text = format!("session start failed: {}", e);
                    });
                }

                store.update(|s| {
                    s.status = ConnectionStatus::Connecting;
                    s.status_text = "connecting".to_string();
                });

                let reason =
                    run_connection(&stream_url, &transport_config, &mut outbound_rx, &events_tx)
                        .await;

                if !policy.should_reconnect() {
                    break;
                }

                // Unexpected close: leave a visible trace in the transcript
                // before retrying.
                store.update(|s| s.push_final_en(format!("[ws closed] {}", reason)));
                info!(%reason, delay_ms = policy.delay().as_millis() as u64, "stream closed, reconnecting");
                tokio::time::sleep(policy.delay()).await;
            }
            info!("session supervisor finished");
        })
    }

    /// Open the microphone and wire it to the transport. Capture failures
    /// surface as status text and leave the stream running receive-only.
    async fn start_capture(&self, outbound_tx: mpsc::Sender<OutboundFrame>) {
        let mut backend: Box<dyn CaptureBackend> =
            Box::new(MicrophoneBackend::new(self.config.audio.device.clone()));

        match backend.start().await {
            Ok(raw_rx) => {
                let encoder = Pcm16Encoder::new(EncoderConfig {
                    chunk_ms: self.config.audio.chunk_ms,
                    ..EncoderConfig::default()
                });
                *self.pipeline.lock().await =
                    Some(spawn_pipeline(raw_rx, outbound_tx, encoder, Arc::clone(&self.store)));
                *self.capture.lock().await = Some(backend);
            }
            Err(CaptureError::PermissionDenied) => {
                warn!("microphone permission denied, continuing without audio");
                self.store.update(|s| {
                    s.status_text = "microphone permission denied".to_string();
                });
            }
            Err(e) => {
                warn!("capture unavailable: {}", e);
                self.store.update(|s| {
                    s.status_text = format!("capture unavailable: {}", e);
                });
            }
        }
    }
}

/// Raw frames in, wire-ready chunks out. Encode failures drop the chunk;
/// a full outbound queue drops audio instead of buffering it, so network
/// stalls never back up into the device callback.
fn spawn_pipeline(
    mut raw_rx: mpsc::Receiver<RawFrame>,
    outbound_tx: mpsc::Sender<OutboundFrame>,
    mut encoder: Pcm16Encoder,
    store: Arc<SessionStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("audio pipeline started");
        while let Some(frame) = raw_rx.recv().await {
            let chunks = match encoder.push(frame) {
                Ok(chunks) => chunks,
                Err(e) => {
                    debug!("encode error, frame dropped: {}", e);
                    continue;
                }
            };
            for chunk in chunks {
                match outbound_tx.try_send(OutboundFrame::Audio(chunk.pcm)) {
                    Ok(()) => store.update(|s| s.stats.chunks_sent += 1),
                    Err(TrySendError::Full(_)) => {
                        trace!("outbound queue full, dropping audio chunk");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("outbound channel closed, stopping pipeline");
                        return;
                    }
                }
            }
        }
        debug!("audio pipeline finished");
    })
}
