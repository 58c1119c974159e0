use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Decides whether a closed stream gets a new connection attempt.
///
/// Infinite retries with one fixed delay; the backend expires sessions on
/// its own schedule (observed: a 30-minute cap) and a short constant pause
/// is enough to avoid a tight loop. A user-requested disconnect flips the
/// stop flag, which is checked before every attempt so the policy never
/// fights an intentional stop.
pub struct ReconnectPolicy {
    delay: Duration,
    stopped: AtomicBool,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            stopped: AtomicBool::new(false),
        }
    }

    /// Fixed pause before each attempt.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Checked before scheduling every attempt.
    pub fn should_reconnect(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    /// Mark the stop as user-requested; no further attempts follow.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Re-arm for a fresh connect() after a user stop.
    pub fn reset(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }
}
