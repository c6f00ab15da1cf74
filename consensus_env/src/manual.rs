//! Virtual clock for driving the monitor loop in tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::SimClock;

/// A clock whose time only moves when told to.
///
/// `sleep()` advances virtual time by the requested amount and yields
/// once, so a monitored run of any length completes instantly.
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    /// Current virtual time
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Creates a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances virtual time by the given duration.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += duration;
    }

    /// Sets virtual time to a specific value.
    pub fn set(&self, time: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = time;
    }
}

#[async_trait]
impl SimClock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}
