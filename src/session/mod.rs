//! Realtime duplex session management
//!
//! This module is the core of the client:
//! - `SessionState`/`SessionStore` — the published record the UI renders
//! - `MessageRouter` — inbound frames to state mutations
//! - `ReconnectPolicy` — fixed-delay, handshake-first reconnects
//! - `SessionManager` — owns the stream, the audio pipeline, and the four
//!   public operations (connect, disconnect, ask, clear history)

mod manager;
mod reconnect;
mod router;
mod state;
mod stats;

pub use manager::SessionManager;
pub use reconnect::ReconnectPolicy;
pub use router::{InboundMessage, MessageRouter, RouterAction};
pub use state::{
    ConnectionStatus, SessionState, SessionStore, ASK_CONTEXT_LINES, MAX_FINAL_LINES,
};
pub use stats::SessionStats;
