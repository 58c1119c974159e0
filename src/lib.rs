pub mod audio;
pub mod backend;
pub mod config;
pub mod session;
pub mod transport;

pub use audio::{
    AudioChunk, CaptureBackend, CaptureError, EncodeError, EncoderConfig, MicrophoneBackend,
    Pcm16Encoder, RawFrame,
};
pub use backend::{AskRequest, AssistantClient, AudioDevice, BackendClient};
pub use config::Config;
pub use session::{
    ConnectionStatus, InboundMessage, MessageRouter, ReconnectPolicy, RouterAction,
    SessionManager, SessionState, SessionStats, SessionStore, ASK_CONTEXT_LINES, MAX_FINAL_LINES,
};
pub use transport::{CloseReason, OutboundFrame, StreamEvent, TransportConfig, WireFormat};
