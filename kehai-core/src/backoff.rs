use std::time::Duration;

use rand::Rng;

use kehai_types::BackoffConfig;

/// Exponential backoff schedule with jitter.
///
/// Delay for attempt `n` (0-based) is `min * factor^n`, capped at `max`, with
/// up to `jitter_percent` of the base value added on top. An upstream
/// `Retry-After` hint overrides the computed base but still honors the cap.
#[derive(Debug, Clone, Copy)]
pub struct BackoffSchedule {
    cfg: BackoffConfig,
}

impl BackoffSchedule {
    /// Build a schedule from its configuration.
    #[must_use]
    pub const fn new(cfg: BackoffConfig) -> Self {
        Self { cfg }
    }

    /// Deterministic base delay for the given 0-based attempt index.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.cfg.factor.max(1));
        let mut ms = self.cfg.min_backoff_ms;
        for _ in 0..attempt {
            ms = ms.saturating_mul(factor);
            if ms >= self.cfg.max_backoff_ms {
                ms = self.cfg.max_backoff_ms;
                break;
            }
        }
        Duration::from_millis(ms.min(self.cfg.max_backoff_ms))
    }

    /// Delay for the given attempt with jitter applied.
    ///
    /// `retry_after_ms` is an upstream hint that replaces the computed base
    /// (capped at the configured maximum); no jitter is added to hints.
    #[must_use]
    pub fn delay(&self, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
        if let Some(hint) = retry_after_ms {
            return Duration::from_millis(hint.min(self.cfg.max_backoff_ms));
        }
        let base = self.base_delay(attempt);
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        let span = base_ms * u64::from(self.cfg.jitter_percent) / 100;
        let jitter = if span == 0 {
            0
        } else {
            rand::rng().random_range(0..=span)
        };
        Duration::from_millis(base_ms.saturating_add(jitter))
    }

    /// Upper bound of any delay this schedule can produce.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        let ms = self.cfg.max_backoff_ms
            + self.cfg.max_backoff_ms * self.cfg.jitter_percent as u64 / 100;
        Duration::from_millis(ms)
    }
}
