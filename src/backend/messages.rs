use serde::{Deserialize, Serialize};

/// One backend-side capture device from `GET /devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub index: i32,
    pub name: String,
}

/// Session-start handshake body (`POST` to the start endpoint). Idempotent
/// from the client's view; re-sent before every reconnect attempt.
#[derive(Debug, Clone, Serialize)]
pub struct StartRequest {
    pub device: Option<String>,
    pub translate_to: String,
}

impl StartRequest {
    pub fn new(device: Option<String>) -> Self {
        Self {
            device,
            translate_to: "tr".to_string(),
        }
    }
}

/// Assistant exchange body (`POST` to the ask endpoint).
#[derive(Debug, Clone, Serialize)]
pub struct AskRequest {
    pub question: String,
    pub context_en: String,
    pub context_tr: String,
    pub target: String,
}

/// Assistant response: `answer` preferred, `text` accepted; anything else is
/// displayed as the raw body.
#[derive(Debug, Clone, Deserialize)]
pub struct AskResponse {
    pub answer: Option<String>,
    pub text: Option<String>,
}

impl AskResponse {
    pub fn into_answer(self) -> Option<String> {
        self.answer.or(self.text)
    }
}
