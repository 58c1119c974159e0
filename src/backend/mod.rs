//! Backend HTTP API client
//!
//! Request/response side of the backend:
//! - GET /devices — backend capture devices for the picker
//! - POST start — session handshake, re-run before every reconnect
//! - POST ask — assistant exchange, one in flight at a time

mod assist;
mod client;
mod messages;

pub use assist::AssistantClient;
pub use client::BackendClient;
pub use messages::{AskRequest, AskResponse, AudioDevice, StartRequest};
