//! Clock abstraction for the harness control loop.

use async_trait::async_trait;
use std::time::Duration;

/// The harness's only source of time.
///
/// The monitor loop measures run duration and stagnation against
/// `now()` and suspends between polling iterations with `sleep()`.
///
/// # Implementations
///
/// - **Production**: `TokioClock` - wraps `tokio::time` and `Instant`
/// - **Test**: `ManualClock` - a virtual clock that advances on `sleep()`
#[async_trait]
pub trait SimClock: Send + Sync + 'static {
    /// Returns the monotonic time elapsed since the clock was created.
    fn now(&self) -> Duration;

    /// Suspends the caller for the given duration.
    ///
    /// This is the single suspension point of the monitor loop; no harness
    /// work happens while it is pending.
    async fn sleep(&self, duration: Duration);
}
