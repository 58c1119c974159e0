use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::BackendConfig;

use super::messages::{AskRequest, AskResponse, AudioDevice, StartRequest};

/// HTTP side of the backend: device listing, the session-start handshake,
/// and the assistant exchange. Every endpoint is optional; a missing URL
/// turns the matching call into a quiet no-op.
pub struct BackendClient {
    http: reqwest::Client,
    start_url: Option<Url>,
    devices_url: Option<Url>,
    ask_url: Option<Url>,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let start_url = config
            .start_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .context("invalid start_url")?;

        // The device listing lives at /devices on the start endpoint's
        // authority; there is no separate configuration knob for it.
        let devices_url = start_url.clone().map(|mut url| {
            url.set_path("/devices");
            url.set_query(None);
            url
        });

        let ask_url = config
            .ask_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .context("invalid ask_url")?;

        Ok(Self {
            http: reqwest::Client::new(),
            start_url,
            devices_url,
            ask_url,
        })
    }

    /// Whether the assistant feature is available at all.
    pub fn can_ask(&self) -> bool {
        self.ask_url.is_some()
    }

    /// Fetch the backend's capture devices, order preserved. Without a start
    /// endpoint the list is empty and selection stays disabled.
    pub async fn list_devices(&self) -> Result<Vec<AudioDevice>> {
        let Some(url) = &self.devices_url else {
            debug!("no start endpoint configured, skipping device listing");
            return Ok(Vec::new());
        };

        let devices: Vec<AudioDevice> = self
            .http
            .get(url.clone())
            .send()
            .await
            .context("device listing request failed")?
            .error_for_status()
            .context("device listing returned an error status")?
            .json()
            .await
            .context("device listing body was not a device array")?;

        info!(count = devices.len(), "fetched backend devices");
        Ok(devices)
    }

    /// Establish or renew server-side pipeline state. Safe to call
    /// repeatedly; the response body is ignored.
    pub async fn start_session(&self, device: Option<&str>) -> Result<()> {
        let Some(url) = &self.start_url else {
            debug!("no start endpoint configured, skipping handshake");
            return Ok(());
        };

        self.http
            .post(url.clone())
            .json(&StartRequest::new(device.map(str::to_string)))
            .send()
            .await
            .context("session-start handshake failed")?;

        debug!(?device, "session-start handshake sent");
        Ok(())
    }

    /// One assistant exchange. Never fails past this boundary: a transport
    /// error or unparseable body becomes the displayed answer text.
    pub async fn ask(&self, request: &AskRequest) -> String {
        let Some(url) = &self.ask_url else {
            return "[ask error] ask endpoint not configured".to_string();
        };

        let response = match self.http.post(url.clone()).json(request).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("ask request failed: {}", e);
                return format!("[ask error] {}", e);
            }
        };

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return format!("[ask error] {}", e),
        };

        match serde_json::from_str::<AskResponse>(&body) {
            Ok(parsed) => parsed.into_answer().unwrap_or(body),
            // Best-effort display: an unexpected body is still an answer.
            Err(_) => body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(start: Option<&str>, ask: Option<&str>) -> BackendClient {
        BackendClient::new(&BackendConfig {
            start_url: start.map(str::to_string),
            stream_url: None,
            ask_url: ask.map(str::to_string),
            device: None,
        })
        .unwrap()
    }

    #[test]
    fn devices_url_is_derived_from_start_authority() {
        let c = client(Some("http://backend:9000/api/start?x=1"), None);
        assert_eq!(
            c.devices_url.as_ref().unwrap().as_str(),
            "http://backend:9000/devices"
        );
    }

    #[test]
    fn absent_endpoints_disable_features() {
        let c = client(None, None);
        assert!(c.start_url.is_none());
        assert!(c.devices_url.is_none());
        assert!(!c.can_ask());
    }

    #[tokio::test]
    async fn no_start_endpoint_yields_empty_device_list() {
        let c = client(None, None);
        assert!(c.list_devices().await.unwrap().is_empty());
        assert!(c.start_session(Some("mic")).await.is_ok());
    }

    #[tokio::test]
    async fn ask_without_endpoint_reports_error_text() {
        let c = client(None, None);
        let answer = c
            .ask(&AskRequest {
                question: "q".into(),
                context_en: String::new(),
                context_tr: String::new(),
                target: "en".into(),
            })
            .await;
        assert!(answer.starts_with("[ask error]"));
    }

    #[test]
    fn device_list_parses_in_order() {
        let body = r#"[{"index":0,"name":"Built-in Mic"},{"index":1,"name":"BlackHole 2ch"}]"#;
        let devices: Vec<AudioDevice> = serde_json::from_str(body).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "Built-in Mic");
        assert_eq!(devices[1].index, 1);
    }
}
