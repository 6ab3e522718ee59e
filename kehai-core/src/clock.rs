use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Injectable time source.
///
/// All wall-clock reads and suspension sleeps inside the aggregation core go
/// through this trait, which is what makes TTL expiry, cooldown windows, and
/// backoff schedules drivable from tests.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time, UTC.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the caller for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by the system time and the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
