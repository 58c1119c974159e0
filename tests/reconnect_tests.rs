// Session manager lifecycle against loopback servers: handshake before every
// attempt, fixed-delay reconnects, and a user disconnect that sticks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use meeting_copilot::config::{AudioConfig, BackendConfig, Config, StreamConfig};
use meeting_copilot::{ConnectionStatus, SessionManager};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// Counting HTTP responder for the `/start` handshake and `/devices`.
async fn spawn_http_server(body: &'static str, requests: Arc<AtomicUsize>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 16 * 1024];
                let mut total = 0;
                loop {
                    let Ok(n) = stream.read(&mut buf[total..]).await else {
                        return;
                    };
                    if n == 0 {
                        break;
                    }
                    total += n;
                    if let Some(header_end) = find(&buf[..total], b"\r\n\r\n") {
                        let headers = String::from_utf8_lossy(&buf[..header_end]);
                        let content_length = headers
                            .lines()
                            .find_map(|line| {
                                line.to_ascii_lowercase()
                                    .strip_prefix("content-length:")
                                    .and_then(|v| v.trim().parse::<usize>().ok())
                            })
                            .unwrap_or(0);
                        if total - (header_end + 4) >= content_length {
                            break;
                        }
                    }
                    if total == buf.len() {
                        break;
                    }
                }

                requests.fetch_add(1, Ordering::SeqCst);
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    addr
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// WebSocket server that sends one final line per connection, then drops it.
async fn spawn_flaky_ws_server(accepts: Arc<AtomicUsize>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let n = accepts.fetch_add(1, Ordering::SeqCst);
            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };
            // Greeting.
            let _ = ws.next().await;
            let _ = ws
                .send(Message::Text(format!(
                    r#"{{"type":"final","en":"connection {}"}}"#,
                    n
                )))
                .await;
            // Simulate a backend-side session expiry.
            let _ = ws.close(None).await;
            while let Ok(Some(_)) = tokio::time::timeout(Duration::from_millis(200), ws.next()).await
            {
            }
        }
    });

    addr
}

fn test_config(start: std::net::SocketAddr, ws: std::net::SocketAddr) -> Config {
    Config {
        backend: BackendConfig {
            start_url: Some(format!("http://{}/start", start)),
            stream_url: Some(format!("ws://{}", ws)),
            ask_url: None,
            device: None,
        },
        audio: AudioConfig {
            enabled: false,
            ..AudioConfig::default()
        },
        stream: StreamConfig {
            keepalive_secs: 60,
            reconnect_delay_ms: 100,
        },
    }
}

#[tokio::test]
async fn handshake_precedes_every_reconnect_and_disconnect_stops_it() {
    let starts = Arc::new(AtomicUsize::new(0));
    let accepts = Arc::new(AtomicUsize::new(0));
    let start_addr = spawn_http_server("{}", Arc::clone(&starts)).await;
    let ws_addr = spawn_flaky_ws_server(Arc::clone(&accepts)).await;

    let manager = SessionManager::new(test_config(start_addr, ws_addr)).unwrap();
    manager.connect().await.unwrap();

    // Each connection is dropped by the server; within a few fixed-delay
    // windows the client must have handshaken and reconnected repeatedly.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(
        accepts.load(Ordering::SeqCst) >= 2,
        "expected at least one reconnect, saw {} connections",
        accepts.load(Ordering::SeqCst)
    );
    assert!(
        starts.load(Ordering::SeqCst) >= accepts.load(Ordering::SeqCst),
        "every connect attempt is preceded by a handshake"
    );

    let state = manager.snapshot();
    assert!(state
        .finals_en
        .iter()
        .any(|line| line.starts_with("connection ")));
    assert!(
        state.finals_en.iter().any(|line| line.starts_with("[ws closed]")),
        "unexpected closes leave a visible transcript line"
    );
    assert!(state.stats.connections >= 2);

    manager.disconnect().await;
    let after_disconnect = accepts.load(Ordering::SeqCst);
    assert_eq!(manager.snapshot().status, ConnectionStatus::Disconnected);

    // No reconnect may follow a user-requested stop.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(accepts.load(Ordering::SeqCst), after_disconnect);

    // Transcript survives the disconnect.
    let final_state = manager.snapshot();
    assert!(final_state.finals_en.len() >= state.finals_en.len());
    assert!(final_state
        .finals_en
        .iter()
        .any(|line| line.starts_with("connection ")));
}

#[tokio::test]
async fn device_list_round_trip_auto_selects_the_first() {
    let requests = Arc::new(AtomicUsize::new(0));
    let addr = spawn_http_server(
        r#"[{"index":0,"name":"Built-in Mic"},{"index":1,"name":"BlackHole 2ch"}]"#,
        Arc::clone(&requests),
    )
    .await;

    let config = Config {
        backend: BackendConfig {
            start_url: Some(format!("http://{}/start", addr)),
            stream_url: None,
            ask_url: None,
            device: None,
        },
        ..Config::default()
    };
    let manager = SessionManager::new(config).unwrap();

    let devices = manager.load_devices().await.unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].name, "Built-in Mic");
    assert_eq!(devices[1].name, "BlackHole 2ch");

    let state = manager.snapshot();
    assert_eq!(state.devices, devices);
    assert_eq!(state.selected_device.as_ref().unwrap().name, "Built-in Mic");

    // An explicit selection is honored and kept across listings.
    assert!(manager.select_device("BlackHole 2ch"));
    assert!(!manager.select_device("No Such Device"));
    manager.load_devices().await.unwrap();
    assert_eq!(
        manager.snapshot().selected_device.unwrap().name,
        "BlackHole 2ch"
    );
}

#[tokio::test]
async fn connect_without_stream_endpoint_is_a_graceful_no_op() {
    let manager = SessionManager::new(Config::default()).unwrap();
    manager.connect().await.unwrap();
    let state = manager.snapshot();
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    assert_eq!(state.status_text, "stream endpoint not configured");
    manager.disconnect().await;
}

#[tokio::test]
async fn clear_history_wipes_transcript_but_not_connection() {
    let manager = SessionManager::new(Config::default()).unwrap();
    let _ = manager.subscribe();
    manager.set_auto_assist(false);
    manager.clear_history();
    let state = manager.snapshot();
    assert!(state.finals_en.is_empty());
    assert!(!state.auto_assist);
}
