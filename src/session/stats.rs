use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters for the status line. Survives reconnects; reset by a new
/// session manager, not by a new connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// When this client session was created
    pub started_at: DateTime<Utc>,

    /// Audio chunks handed to the transport
    pub chunks_sent: usize,

    /// Final transcript lines received (both languages)
    pub lines_received: usize,

    /// Completed physical connections (reconnects show up here)
    pub connections: usize,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            chunks_sent: 0,
            lines_received: 0,
            connections: 0,
        }
    }
}

impl SessionStats {
    pub fn uptime_secs(&self) -> f64 {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        elapsed.num_milliseconds() as f64 / 1000.0
    }
}
