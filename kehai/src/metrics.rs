//! Per-source success/latency counters and the reorder evaluation they feed.
//!
//! Counters live for the process lifetime; a separate window view is drained
//! by each evaluation cycle so promotion/demotion judges recent behavior, not
//! history.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use tracing::debug;

use kehai_types::{DataType, ErrorKind, ReorderConfig};

/// Open attempt against one source; close it with
/// [`MetricsSink::end_attempt`].
#[derive(Debug)]
pub struct AttemptHandle {
    source_id: String,
    data_type: DataType,
    started: Instant,
}

/// Outcome of one source attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The source produced a quote.
    Success,
    /// The source failed with the classified kind.
    Failure(ErrorKind),
}

/// Raw counters for one `(source, data type)` pair.
#[derive(Debug, Clone, Default)]
pub struct SourceCounters {
    /// Attempts opened.
    pub requests: u64,
    /// Attempts that produced a quote.
    pub successes: u64,
    /// Attempts that failed.
    pub failures: u64,
    /// Sum of observed latencies, milliseconds.
    pub latency_sum_ms: u64,
    /// Number of latency samples.
    pub latency_count: u64,
    /// Failures by kind.
    pub error_kinds: HashMap<ErrorKind, u64>,
}

impl SourceCounters {
    /// Fraction of attempts that succeeded (1.0 when no attempts).
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            1.0
        } else {
            self.successes as f64 / self.requests as f64
        }
    }

    /// Mean observed latency in milliseconds (0 when no samples).
    #[must_use]
    pub fn avg_latency_ms(&self) -> f64 {
        if self.latency_count == 0 {
            0.0
        } else {
            self.latency_sum_ms as f64 / self.latency_count as f64
        }
    }

    fn record(&mut self, outcome: AttemptOutcome, latency_ms: u64) {
        self.requests += 1;
        self.latency_sum_ms += latency_ms;
        self.latency_count += 1;
        match outcome {
            AttemptOutcome::Success => self.successes += 1,
            AttemptOutcome::Failure(kind) => {
                self.failures += 1;
                *self.error_kinds.entry(kind).or_insert(0) += 1;
            }
        }
    }

    fn throttled_share(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        let throttled = self.error_kinds.get(&ErrorKind::RateLimit).copied().unwrap_or(0)
            + self.error_kinds.get(&ErrorKind::Timeout).copied().unwrap_or(0);
        throttled as f64 / self.requests as f64
    }
}

/// One priority adjustment produced by an evaluation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderDecision {
    /// Data type whose list is adjusted.
    pub data_type: DataType,
    /// Source to move.
    pub source_id: String,
    /// `+1` promotes, `-1` demotes.
    pub delta: i32,
}

/// The metrics sink: lifetime and window counters per `(source, data type)`.
#[derive(Default)]
pub struct MetricsSink {
    lifetime: Mutex<HashMap<(String, DataType), SourceCounters>>,
    window: Mutex<HashMap<(String, DataType), SourceCounters>>,
}

impl MetricsSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an attempt against one source.
    #[must_use]
    pub fn begin_attempt(&self, source_id: &str, data_type: DataType) -> AttemptHandle {
        AttemptHandle {
            source_id: source_id.to_string(),
            data_type,
            started: Instant::now(),
        }
    }

    /// Close an attempt, recording its outcome and latency.
    pub fn end_attempt(&self, handle: AttemptHandle, outcome: AttemptOutcome) {
        let latency_ms =
            u64::try_from(handle.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let key = (handle.source_id, handle.data_type);
        for map in [&self.lifetime, &self.window] {
            map.lock()
                .expect("mutex poisoned")
                .entry(key.clone())
                .or_default()
                .record(outcome, latency_ms);
        }
    }

    /// Lifetime counters for one pair (zeroed when never attempted).
    #[must_use]
    pub fn counters(&self, source_id: &str, data_type: DataType) -> SourceCounters {
        self.lifetime
            .lock()
            .expect("mutex poisoned")
            .get(&(source_id.to_string(), data_type))
            .cloned()
            .unwrap_or_default()
    }

    /// Judge the current window and drain it.
    ///
    /// Sources with at least `min_samples` attempts are promoted when their
    /// success rate and latency clear the bars, and demoted when the success
    /// rate drops below the floor or rate-limit/timeout failures dominate.
    #[must_use]
    pub fn evaluate(&self, cfg: &ReorderConfig) -> Vec<ReorderDecision> {
        let window = std::mem::take(&mut *self.window.lock().expect("mutex poisoned"));
        let mut decisions = Vec::new();
        for ((source_id, data_type), counters) in window {
            if counters.requests < cfg.min_samples {
                continue;
            }
            let success_rate = counters.success_rate();
            let avg_latency = counters.avg_latency_ms();
            let delta = if success_rate < cfg.demote_success_rate
                || counters.throttled_share() > 0.5
            {
                -1
            } else if success_rate > cfg.promote_success_rate
                && avg_latency < cfg.promote_max_avg_latency_ms as f64
            {
                1
            } else {
                continue;
            };
            debug!(
                target = "kehai::metrics",
                event = "reorder_decision",
                source = %source_id,
                data_type = %data_type,
                success_rate,
                avg_latency_ms = avg_latency,
                delta,
            );
            decisions.push(ReorderDecision {
                data_type,
                source_id,
                delta,
            });
        }
        decisions
    }
}
