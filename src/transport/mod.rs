//! Duplex stream transport
//!
//! One `run_connection` call owns one physical WebSocket connection: dial,
//! greeting, send/receive/keep-alive loop, single terminal close event. The
//! transport never reconnects itself; that decision lives with the session
//! manager's reconnect policy.

mod frames;
mod stream;

pub use frames::{encode_audio, OutboundFrame, WireFormat, GREETING, KEEPALIVE_TEXT, WIRE_SAMPLE_RATE};
pub use stream::{run_connection, CloseReason, StreamEvent, TransportConfig, TransportState};
