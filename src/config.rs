use anyhow::Result;
use serde::Deserialize;

use crate::transport::WireFormat;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

/// Backend endpoints. Every URL is optional: a missing endpoint disables the
/// corresponding feature (empty device list, ask unavailable, stream never
/// connects) instead of failing at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendConfig {
    /// Session-start handshake (POST). The device listing endpoint is derived
    /// from this URL's authority at path `/devices`.
    pub start_url: Option<String>,
    /// Duplex transcript stream (ws:// or wss://).
    pub stream_url: Option<String>,
    /// Assistant request endpoint (POST).
    pub ask_url: Option<String>,
    /// Backend-side capture device to request in the handshake. When unset,
    /// the first listed device is used once `/devices` has been fetched.
    pub device: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Stream microphone audio to the backend. Disable for receive-only use.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Local input device name (cpal). Unset means the system default input.
    pub device: Option<String>,
    /// Duration of each encoded PCM chunk in milliseconds.
    #[serde(default = "default_chunk_ms")]
    pub chunk_ms: u64,
    /// How audio chunks are framed on the wire. Fixed at configuration time,
    /// never negotiated with the backend.
    #[serde(default)]
    pub wire_format: WireFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Keep-alive interval in seconds (WebSocket ping + text "ping" frame).
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    /// Fixed delay between reconnect attempts in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_chunk_ms() -> u64 {
    100
}

fn default_keepalive_secs() -> u64 {
    20
}

fn default_reconnect_delay_ms() -> u64 {
    900
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: None,
            chunk_ms: default_chunk_ms(),
            wire_format: WireFormat::default(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive_secs(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_endpoints_deserialize_as_none() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert!(cfg.backend.start_url.is_none());
        assert!(cfg.backend.stream_url.is_none());
        assert!(cfg.backend.ask_url.is_none());
        assert!(cfg.audio.enabled);
        assert_eq!(cfg.audio.chunk_ms, 100);
        assert_eq!(cfg.stream.keepalive_secs, 20);
        assert_eq!(cfg.stream.reconnect_delay_ms, 900);
    }

    #[test]
    fn load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copilot.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
[backend]
start_url = "http://localhost:8000/start"
stream_url = "ws://localhost:8000/ws"

[audio]
enabled = false
wire_format = "json_base64"
"#
        )
        .unwrap();

        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(
            cfg.backend.start_url.as_deref(),
            Some("http://localhost:8000/start")
        );
        assert!(cfg.backend.ask_url.is_none());
        assert!(!cfg.audio.enabled);
        assert_eq!(cfg.audio.wire_format, WireFormat::JsonBase64);
    }
}
