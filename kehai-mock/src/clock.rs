use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use kehai_core::clock::Clock;

/// Manually driven [`Clock`].
///
/// `sleep` returns immediately and advances the clock by the requested
/// duration, so backoff schedules and TTL windows play out instantly in
/// tests. Requested sleeps are recorded for assertions.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    /// Create a clock pinned to a fixed, readable start instant.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap())
    }

    /// Create a clock starting at the given instant.
    #[must_use]
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            slept: Mutex::new(Vec::new()),
        }
    }

    /// Advance the clock without recording a sleep.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("mutex poisoned");
        *now += chrono::Duration::from_std(by).expect("duration in range");
    }

    /// Sleeps requested so far, in call order.
    #[must_use]
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().expect("mutex poisoned").clone()
    }

    /// Sum of all requested sleeps.
    #[must_use]
    pub fn total_slept(&self) -> Duration {
        self.slept().into_iter().sum()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("mutex poisoned")
    }

    async fn sleep(&self, duration: Duration) {
        self.slept.lock().expect("mutex poisoned").push(duration);
        self.advance(duration);
        // Yield so competing tasks interleave the way a real sleep would allow.
        tokio::task::yield_now().await;
    }
}
