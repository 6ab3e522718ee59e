//! Batch fan-out: bounded worker pool over a job channel, with cache
//! pre-check, blacklist split, duplicate coalescing, deadline/cancel
//! handling, and the high-failure-rate alert.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kehai_core::alert::{Alert, AlertSeverity};
use kehai_types::{DataType, Quote};

use crate::cache::cache_key;
use crate::fallback::default_quote;
use crate::resolver::resolve_symbol;
use crate::service::Context;

/// Caller-supplied bounds on one batch invocation.
#[derive(Debug, Default, Clone)]
pub struct BatchOptions {
    /// Overall wall-clock budget; unfinished symbols default when it fires.
    pub deadline: Option<Duration>,
    /// External cancel signal; observed at suspension points.
    pub cancel: Option<CancellationToken>,
}

/// Run one batch. Always returns one entry per unique input symbol.
pub(crate) async fn dispatch(
    ctx: &Arc<Context>,
    data_type: DataType,
    symbols: &[String],
    refresh: bool,
    opts: BatchOptions,
) -> HashMap<String, Quote> {
    // Duplicate inputs coalesce to one job whose result serves them all.
    let mut unique: Vec<String> = Vec::with_capacity(symbols.len());
    let mut seen = std::collections::HashSet::new();
    for s in symbols {
        if seen.insert(s.as_str()) {
            unique.push(s.clone());
        }
    }
    if unique.is_empty() {
        return HashMap::new();
    }

    let cancel = opts.cancel.unwrap_or_default();
    if cancel.is_cancelled() {
        let now = ctx.clock.now();
        return unique
            .iter()
            .map(|s| (s.clone(), default_quote(s, data_type, now)))
            .collect();
    }

    // The deadline cancels a child token so the caller's own token stays
    // reusable across batches.
    let batch_cancel = cancel.child_token();
    let watchdog = opts.deadline.map(|deadline| {
        let batch_cancel = batch_cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            batch_cancel.cancel();
        })
    });

    let mut results: HashMap<String, Quote> = HashMap::new();
    let mut pending: Vec<String> = Vec::new();

    // Bulk cache pre-check: fresh hits short-circuit and consume no worker.
    if refresh {
        pending = unique.clone();
    } else {
        let probes = unique.iter().map(|symbol| {
            let key = cache_key(data_type, symbol);
            async move { ctx.cache.get(&key).await }
        });
        for (symbol, probe) in unique.iter().zip(futures::future::join_all(probes).await) {
            match probe {
                Ok(Some(hit)) => {
                    results.insert(symbol.clone(), hit.quote.as_cache_hit());
                }
                Ok(None) => pending.push(symbol.clone()),
                Err(e) => {
                    warn!(
                        target = "kehai::dispatch",
                        event = "precheck_failed",
                        symbol = %symbol,
                        error = %e,
                        "treating as cache miss"
                    );
                    pending.push(symbol.clone());
                }
            }
        }
    }

    // Blacklist split: cold symbols go straight to defaults.
    let mut jobs: Vec<String> = Vec::new();
    for symbol in pending {
        match ctx.blacklist.ensure_warm(&symbol, data_type).await {
            Ok(()) => jobs.push(symbol),
            Err(cold) => {
                debug!(
                    target = "kehai::dispatch",
                    event = "blacklisted",
                    symbol = %symbol,
                    error = %cold,
                );
                let quote = default_quote(&symbol, data_type, ctx.clock.now());
                results.insert(symbol, quote);
            }
        }
    }

    let expected = jobs.len();
    if expected > 0 {
        let workers = ctx.cfg.dispatch.workers_for(data_type).max(1).min(expected);
        let (job_tx, job_rx) = mpsc::channel::<String>(expected);
        let (result_tx, mut result_rx) = mpsc::channel::<(String, Quote)>(expected);
        let job_rx = Arc::new(Mutex::new(job_rx));

        for symbol in &jobs {
            // Capacity equals the job count, so these sends never block.
            let _ = job_tx.try_send(symbol.clone());
        }
        drop(job_tx);

        for _ in 0..workers {
            let ctx = Arc::clone(ctx);
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let worker_cancel = batch_cancel.clone();
            tokio::spawn(async move {
                loop {
                    let Some(symbol) = job_rx.lock().await.recv().await else {
                        break;
                    };
                    let quote = if worker_cancel.is_cancelled() {
                        default_quote(&symbol, data_type, ctx.clock.now())
                    } else {
                        resolve_symbol(&ctx, data_type, &symbol, refresh, &worker_cancel).await
                    };
                    if result_tx.send((symbol, quote)).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        let mut received = 0;
        while received < expected {
            match result_rx.recv().await {
                Some((symbol, quote)) => {
                    results.insert(symbol, quote);
                    received += 1;
                }
                None => break,
            }
        }
    }

    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }

    // Workers observe cancellation at suspension points; anything that still
    // slipped through the cracks defaults here.
    let now = ctx.clock.now();
    for symbol in &unique {
        results
            .entry(symbol.clone())
            .or_insert_with(|| default_quote(symbol, data_type, now));
    }

    let defaulted = results.values().filter(|q| q.is_default).count();
    debug!(
        target = "kehai::dispatch",
        event = "batch_done",
        data_type = %data_type,
        requested = unique.len(),
        defaulted,
    );

    let alerts = &ctx.cfg.alerts;
    if unique.len() >= alerts.min_batch_for_alert {
        let failure_rate = defaulted as f64 / unique.len() as f64;
        if failure_rate > alerts.batch_failure_threshold {
            info!(
                target = "kehai::dispatch",
                event = "high_failure_rate",
                data_type = %data_type,
                failure_rate,
            );
            ctx.throttle
                .emit(Alert::new(
                    format!("{data_type}:high-failure-rate"),
                    AlertSeverity::Warning,
                    format!("high failure rate for {data_type} batch"),
                    format!(
                        "{defaulted} of {} symbols fell back to defaults ({:.0}%)",
                        unique.len(),
                        failure_rate * 100.0
                    ),
                ))
                .await;
        }
    }

    results
}
