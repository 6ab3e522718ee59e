//! Periodic pre-warm & sweep loop.
//!
//! One tick = sweep expired cache/blacklist entries, refresh the configured
//! hot sets through the dispatcher, and emit a summary. The loop is
//! single-flight: a tick that fires while the previous one still runs is
//! skipped, not queued, and missed ticks are not caught up.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::oneshot;
use tracing::{info, warn};

use kehai_core::alert::{Alert, AlertSeverity};
use kehai_core::task::TaskHandle;

use crate::dispatch::{BatchOptions, dispatch};
use crate::service::Context;

/// What one pre-warm tick accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrewarmSummary {
    /// True when the tick was skipped because another was still running.
    pub skipped: bool,
    /// Expired cache entries removed.
    pub swept_cache: usize,
    /// Elapsed blacklist entries removed.
    pub swept_blacklist: usize,
    /// Hot-set symbols refreshed.
    pub refreshed: usize,
    /// Refreshes that fell back to a default quote.
    pub defaulted: usize,
}

impl PrewarmSummary {
    /// Fraction of refreshes that fell back to defaults.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        if self.refreshed == 0 {
            0.0
        } else {
            self.defaulted as f64 / self.refreshed as f64
        }
    }
}

/// Run one tick now. Shared by the loop and the manual `pre_warm` API.
pub(crate) async fn run_prewarm_once(ctx: &Arc<Context>) -> PrewarmSummary {
    if ctx
        .prewarm_running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return PrewarmSummary {
            skipped: true,
            ..PrewarmSummary::default()
        };
    }

    let mut summary = PrewarmSummary::default();

    match ctx.cache.sweep().await {
        Ok(count) => summary.swept_cache = count,
        Err(e) => warn!(
            target = "kehai::scheduler",
            event = "cache_sweep_failed",
            error = %e,
        ),
    }
    match ctx.blacklist.sweep().await {
        Ok(count) => summary.swept_blacklist = count,
        Err(e) => warn!(
            target = "kehai::scheduler",
            event = "blacklist_sweep_failed",
            error = %e,
        ),
    }

    for data_type in ctx.registry.data_types() {
        let hot_set = ctx.cfg.prewarm.hot_set_for(data_type).to_vec();
        if hot_set.is_empty() {
            continue;
        }
        let results = dispatch(ctx, data_type, &hot_set, true, BatchOptions::default()).await;
        summary.refreshed += results.len();
        summary.defaulted += results.values().filter(|q| q.is_default).count();
    }

    info!(
        target = "kehai::scheduler",
        event = "prewarm_done",
        swept_cache = summary.swept_cache,
        swept_blacklist = summary.swept_blacklist,
        refreshed = summary.refreshed,
        defaulted = summary.defaulted,
    );

    if summary.refreshed > 0 && summary.failure_rate() >= 0.2 {
        ctx.throttle
            .emit(Alert::new(
                "prewarm:high-failure-rate",
                AlertSeverity::Warning,
                "pre-warm degraded",
                format!(
                    "{} of {} hot-set symbols fell back to defaults",
                    summary.defaulted, summary.refreshed
                ),
            ))
            .await;
    }

    ctx.prewarm_running.store(false, Ordering::SeqCst);
    summary
}

/// Spawn the periodic loop; the handle stops it.
pub(crate) fn spawn(ctx: Arc<Context>) -> TaskHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let interval = ctx.cfg.prewarm.interval;
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately; consume it so
        // the initial pre-warm happens one full interval after startup.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    let _ = run_prewarm_once(&ctx).await;
                }
            }
        }
    });
    TaskHandle::new(task, stop_tx)
}
