//! Token-bucket pacing keyed by `(source, data type)`.
//!
//! Workers draw one token before every upstream issue; an exhausted bucket
//! suspends the worker until the refill catches up, which together with the
//! worker pool size bounds upstream QPS.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use kehai_types::{DataType, KehaiError, RateLimitConfig};

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// One token bucket with a sustained refill rate and a burst capacity.
pub struct TokenBucket {
    qps: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    fn new(qps: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            qps,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, suspending until the refill makes one available.
    async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().expect("mutex poisoned");
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.qps).min(self.capacity);
                state.last_refill = now;
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.qps)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

/// Registry of token buckets, one per `(source, data type)` pair.
///
/// Buckets are created lazily on first acquisition and live for the process
/// lifetime so the refill state survives across batches.
pub struct PacingGate {
    cfg: RateLimitConfig,
    buckets: Mutex<HashMap<(String, DataType), Arc<TokenBucket>>>,
}

impl PacingGate {
    /// Build the gate from its configuration.
    #[must_use]
    pub fn new(cfg: RateLimitConfig) -> Self {
        Self {
            cfg,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn bucket(&self, source_id: &str, data_type: DataType) -> Arc<TokenBucket> {
        let mut buckets = self.buckets.lock().expect("mutex poisoned");
        Arc::clone(
            buckets
                .entry((source_id.to_string(), data_type))
                .or_insert_with(|| {
                    let (qps, burst) = self.cfg.limit_for(source_id, data_type);
                    Arc::new(TokenBucket::new(qps, burst))
                }),
        )
    }

    /// Draw one token for an issue to `source_id`, observing cancellation.
    ///
    /// # Errors
    /// Returns `Cancelled` when the token fires before a token is available.
    pub async fn acquire(
        &self,
        source_id: &str,
        data_type: DataType,
        cancel: &CancellationToken,
    ) -> Result<(), KehaiError> {
        let bucket = self.bucket(source_id, data_type);
        tokio::select! {
            () = cancel.cancelled() => Err(KehaiError::Cancelled),
            () = bucket.acquire() => Ok(()),
        }
    }
}
