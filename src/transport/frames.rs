use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

/// Text frame sent immediately after the stream opens. Wakes a backend that
/// blocks on its first `receive_text()`.
pub const GREETING: &str = "hello";

/// Lightweight text frame sent alongside the protocol-level ping. Some
/// middleboxes drop idle connections that only see control frames.
pub const KEEPALIVE_TEXT: &str = "ping";

/// Sample rate of every audio chunk put on the wire.
pub const WIRE_SAMPLE_RATE: u32 = 16_000;

/// How binary PCM chunks are framed on the wire. Chosen once at configuration
/// time; the backend does not negotiate this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// Raw little-endian PCM16 bytes in a binary frame.
    #[default]
    BinaryPcm,
    /// JSON text frame with base64 audio payload.
    JsonBase64,
}

/// A frame queued for transmission. Best-effort: frames in flight during a
/// connection transition may be dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// One encoded audio chunk (mono PCM16 @ 16 kHz, little-endian bytes).
    Audio(Vec<u8>),
    /// A control text message (greeting, keep-alive, etc).
    Text(String),
}

#[derive(Serialize)]
struct AudioEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    audio: &'a str,
    format: &'static str,
    sample_rate_hz: u32,
}

/// Encode one PCM16 chunk as a WebSocket message per the configured wire
/// format.
pub fn encode_audio(pcm: &[u8], wire_format: WireFormat) -> Message {
    match wire_format {
        WireFormat::BinaryPcm => Message::Binary(pcm.to_vec()),
        WireFormat::JsonBase64 => {
            let audio = base64::engine::general_purpose::STANDARD.encode(pcm);
            let envelope = AudioEnvelope {
                kind: "input_audio_buffer.append",
                audio: &audio,
                format: "pcm16",
                sample_rate_hz: WIRE_SAMPLE_RATE,
            };
            // Serialization of a flat struct of strings cannot fail.
            let json = serde_json::to_string(&envelope).unwrap_or_default();
            Message::Text(json)
        }
    }
}

impl OutboundFrame {
    pub fn into_message(self, wire_format: WireFormat) -> Message {
        match self {
            OutboundFrame::Audio(pcm) => encode_audio(&pcm, wire_format),
            OutboundFrame::Text(text) => Message::Text(text),
        }
    }
}
