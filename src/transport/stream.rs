use std::fmt;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::frames::{OutboundFrame, WireFormat, GREETING, KEEPALIVE_TEXT};

/// Lifecycle of one physical stream connection.
///
/// `Idle -> Connecting -> Open -> Closing -> Closed`, with `Open -> Closed`
/// reachable directly on network failure. A connection never outlives one
/// handshake; restarting is the reconnect policy's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Why a connection ended. Carried by the single terminal `Closed` event.
#[derive(Debug, Clone)]
pub enum CloseReason {
    /// Clean close: server close frame, end of stream, or local shutdown.
    Normal,
    /// The connection attempt itself failed.
    ConnectFailed(String),
    /// The open connection broke.
    Error(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Normal => write!(f, "closed"),
            CloseReason::ConnectFailed(e) => write!(f, "connect failed: {}", e),
            CloseReason::Error(e) => write!(f, "error: {}", e),
        }
    }
}

impl CloseReason {
    pub fn is_error(&self) -> bool {
        !matches!(self, CloseReason::Normal)
    }
}

/// Events a connection delivers to its single dispatcher.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Opened,
    /// One inbound text frame (binary frames holding UTF-8 are folded in).
    Message(String),
    /// Terminal; emitted exactly once per connection.
    Closed(CloseReason),
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub keepalive: Duration,
    pub wire_format: WireFormat,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(20),
            wire_format: WireFormat::default(),
        }
    }
}

/// Drive one connection from dial to close.
///
/// Outbound frames are drained from `outbound`; closing that channel requests
/// a clean shutdown. Inbound frames and the terminal close are delivered to
/// `events`. Returns the close reason (also emitted as the last event).
pub async fn run_connection(
    url: &str,
    config: &TransportConfig,
    outbound: &mut mpsc::Receiver<OutboundFrame>,
    events: &mpsc::Sender<StreamEvent>,
) -> CloseReason {
    debug!(url, state = ?TransportState::Connecting, "connecting to stream");

    let ws = match connect_async(url).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            let reason = CloseReason::ConnectFailed(e.to_string());
            let _ = events.send(StreamEvent::Closed(reason.clone())).await;
            return reason;
        }
    };

    info!(url, state = ?TransportState::Open, "stream open");
    let _ = events.send(StreamEvent::Opened).await;

    let (mut sink, mut source) = ws.split();

    // Greeting first: the backend may block on its first read.
    if let Err(e) = sink.send(Message::Text(GREETING.to_string())).await {
        let reason = CloseReason::Error(e.to_string());
        let _ = events.send(StreamEvent::Closed(reason.clone())).await;
        return reason;
    }

    let mut keepalive = tokio::time::interval(config.keepalive);
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; the greeting already went out.
    keepalive.tick().await;

    let reason = loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(frame.into_message(config.wire_format)).await {
                        // Best-effort transport: the frame is lost, the close
                        // reason tells the story.
                        warn!("stream send failed: {}", e);
                        break CloseReason::Error(e.to_string());
                    }
                }
                None => {
                    // Local shutdown requested.
                    debug!(state = ?TransportState::Closing, "closing stream");
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        debug!("close frame not delivered: {}", e);
                    }
                    break CloseReason::Normal;
                }
            },
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(StreamEvent::Message(text)).await;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    // The backend may frame JSON as binary; non-UTF-8 payloads
                    // carry nothing we can route.
                    match String::from_utf8(bytes) {
                        Ok(text) => {
                            let _ = events.send(StreamEvent::Message(text)).await;
                        }
                        Err(_) => debug!("dropping non-UTF-8 binary frame"),
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        break CloseReason::Error("pong send failed".to_string());
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    match frame {
                        Some(frame) => info!(code = %frame.code, "server closed stream"),
                        None => info!("server closed stream"),
                    }
                    break CloseReason::Normal;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break CloseReason::Error(e.to_string()),
                None => break CloseReason::Normal,
            },
            _ = keepalive.tick() => {
                // Protocol ping plus a text "ping"; the latter defeats idle
                // timeouts in middleboxes that ignore control frames.
                if sink.send(Message::Ping(Vec::new())).await.is_err()
                    || sink.send(Message::Text(KEEPALIVE_TEXT.to_string())).await.is_err()
                {
                    break CloseReason::Error("keep-alive send failed".to_string());
                }
            }
        }
    };

    debug!(state = ?TransportState::Closed, %reason, "stream finished");
    let _ = events.send(StreamEvent::Closed(reason.clone())).await;
    reason
}
