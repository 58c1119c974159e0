use tokio::sync::watch;

use crate::backend::AudioDevice;

use super::stats::SessionStats;

/// Final lines kept per language; oldest dropped beyond this.
pub const MAX_FINAL_LINES: usize = 600;

/// Final lines per language included as assistant context.
pub const ASK_CONTEXT_LINES: usize = 12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// The published session record the UI renders. Outlives any single stream
/// connection; reconnects touch only `status` and `status_text`.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub status: ConnectionStatus,
    /// Human-readable status line ("connecting", "stream closed: ...").
    pub status_text: String,

    /// In-progress line for the current utterance, overwritten wholesale.
    pub partial_en: String,
    pub partial_tr: String,
    /// Completed lines, append-only within a session, capped.
    pub finals_en: Vec<String>,
    pub finals_tr: Vec<String>,

    /// Question most recently detected by the backend.
    pub last_question_en: String,
    pub assistant_answer: String,
    /// True exactly while one assistant exchange is running.
    pub drafting: bool,
    /// Detected questions trigger an assistant request automatically.
    pub auto_assist: bool,

    pub devices: Vec<AudioDevice>,
    pub selected_device: Option<AudioDevice>,

    pub stats: SessionStats,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            status_text: "disconnected".to_string(),
            partial_en: String::new(),
            partial_tr: String::new(),
            finals_en: Vec::new(),
            finals_tr: Vec::new(),
            last_question_en: String::new(),
            assistant_answer: String::new(),
            drafting: false,
            auto_assist: true,
            devices: Vec::new(),
            selected_device: None,
            stats: SessionStats::default(),
        }
    }
}

impl SessionState {
    pub fn push_final_en(&mut self, line: impl Into<String>) {
        push_capped(&mut self.finals_en, line.into());
        self.stats.lines_received += 1;
    }

    pub fn push_final_tr(&mut self, line: impl Into<String>) {
        push_capped(&mut self.finals_tr, line.into());
        self.stats.lines_received += 1;
    }

    /// Last few final lines, oldest first, for assistant context.
    pub fn context_en(&self) -> String {
        tail_joined(&self.finals_en, ASK_CONTEXT_LINES)
    }

    pub fn context_tr(&self) -> String {
        tail_joined(&self.finals_tr, ASK_CONTEXT_LINES)
    }

    /// Explicit trimmed non-empty question, else the last detected one,
    /// else empty.
    pub fn effective_question(&self, explicit: Option<&str>) -> String {
        match explicit.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => q.to_string(),
            None => self.last_question_en.clone(),
        }
    }

    /// Wipe the transcript and assistant panel; connectivity is untouched.
    pub fn clear_history(&mut self) {
        self.partial_en.clear();
        self.partial_tr.clear();
        self.finals_en.clear();
        self.finals_tr.clear();
        self.last_question_en.clear();
        self.assistant_answer.clear();
    }
}

fn push_capped(lines: &mut Vec<String>, line: String) {
    lines.push(line);
    if lines.len() > MAX_FINAL_LINES {
        let excess = lines.len() - MAX_FINAL_LINES;
        lines.drain(..excess);
    }
}

fn tail_joined(lines: &[String], count: usize) -> String {
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

/// Owner of the published state. All mutation goes through `update`, which
/// notifies subscribers synchronously within the caller's context; there is
/// no cross-thread notification race to reason about.
pub struct SessionStore {
    tx: watch::Sender<SessionState>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::default());
        Self { tx }
    }

    pub fn update(&self, f: impl FnOnce(&mut SessionState)) {
        self.tx.send_modify(f);
    }

    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finals_are_capped_keeping_newest_in_order() {
        let mut state = SessionState::default();
        for i in 0..650 {
            state.push_final_en(format!("line {}", i));
        }
        assert_eq!(state.finals_en.len(), MAX_FINAL_LINES);
        assert_eq!(state.finals_en[0], "line 50");
        assert_eq!(state.finals_en.last().unwrap(), "line 649");
    }

    #[test]
    fn context_is_the_last_twelve_lines() {
        let mut state = SessionState::default();
        for i in 0..20 {
            state.push_final_en(format!("en {}", i));
        }
        let ctx = state.context_en();
        let lines: Vec<&str> = ctx.lines().collect();
        assert_eq!(lines.len(), ASK_CONTEXT_LINES);
        assert_eq!(lines[0], "en 8");
        assert_eq!(lines[11], "en 19");
    }

    #[test]
    fn effective_question_prefers_trimmed_explicit() {
        let mut state = SessionState::default();
        state.last_question_en = "detected?".to_string();
        assert_eq!(state.effective_question(Some("  typed?  ")), "typed?");
        assert_eq!(state.effective_question(Some("   ")), "detected?");
        assert_eq!(state.effective_question(None), "detected?");
        state.last_question_en.clear();
        assert_eq!(state.effective_question(None), "");
    }

    #[test]
    fn clear_history_leaves_connectivity_alone() {
        let mut state = SessionState::default();
        state.status = ConnectionStatus::Connected;
        state.push_final_en("a");
        state.partial_tr = "tr".into();
        state.assistant_answer = "answer".into();
        state.clear_history();
        assert!(state.finals_en.is_empty());
        assert!(state.partial_tr.is_empty());
        assert!(state.assistant_answer.is_empty());
        assert_eq!(state.status, ConnectionStatus::Connected);
    }

    #[test]
    fn store_notifies_subscribers_on_update() {
        let store = SessionStore::new();
        let mut rx = store.subscribe();
        store.update(|s| s.status_text = "hello".into());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().status_text, "hello");
    }
}
