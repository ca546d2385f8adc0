//! Drop-if-too-soon rate limiter.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Accepts at most one call per interval; calls inside the window are
/// dropped, not queued.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True if the call may proceed. Accepting a call starts a new window.
    pub fn try_acquire(&self) -> bool {
        let mut last = self.last.lock();
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.interval => {
                tracing::debug!("Throttled call dropped ({:?} since last)", now.duration_since(at));
                false
            }
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
