//! Single-symbol resolution: cache → blacklist → ordered sources → default.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use kehai_core::alert::{Alert, AlertSeverity};
use kehai_core::fetcher::QuoteFetcher;
use kehai_types::{DataType, ErrorKind, KehaiError, Quote};

use crate::cache::cache_key;
use crate::fallback::default_quote;
use crate::metrics::AttemptOutcome;
use crate::retry::fetch_with_retry;
use crate::service::Context;
use crate::validator::{Assessment, Severity};

/// Resolve one symbol to a quote. Never fails: every failure path ends in a
/// marked default.
pub(crate) async fn resolve_symbol(
    ctx: &Context,
    data_type: DataType,
    symbol: &str,
    refresh: bool,
    cancel: &CancellationToken,
) -> Quote {
    let key = cache_key(data_type, symbol);

    // Cache probe. Store failures read as a miss: availability over freshness.
    let mut previous: Option<Quote> = None;
    if refresh {
        if ctx.validator.enabled()
            && let Ok(Some(hit)) = ctx.cache.get(&key).await
        {
            previous = Some(hit.quote);
        }
    } else {
        match ctx.cache.get(&key).await {
            Ok(Some(hit)) => {
                debug!(
                    target = "kehai::resolver",
                    event = "cache_hit",
                    key = %key,
                    remaining_secs = hit.remaining_ttl.as_secs(),
                );
                return hit.quote.as_cache_hit();
            }
            Ok(None) => {}
            Err(e) => warn!(
                target = "kehai::resolver",
                event = "cache_read_failed",
                key = %key,
                error = %e,
                "treating as cache miss"
            ),
        }
    }

    if cancel.is_cancelled() {
        return default_quote(symbol, data_type, ctx.clock.now());
    }

    // Blacklist check: cold symbols skip upstream work entirely. The skip is
    // not a new failure, so the counter stays put.
    if let Err(cold) = ctx.blacklist.ensure_warm(symbol, data_type).await {
        debug!(
            target = "kehai::resolver",
            event = "blacklisted",
            symbol,
            data_type = %data_type,
            error = %cold,
        );
        return synthesize(ctx, data_type, symbol, &key, cancel).await;
    }

    let sources = ctx.registry.sources_for(data_type);
    let outcome = if ctx.validator.median_mode_for(data_type) {
        resolve_median(ctx, data_type, symbol, previous.as_ref(), &sources, cancel).await
    } else {
        resolve_priority(ctx, data_type, symbol, previous.as_ref(), &sources, cancel).await
    };

    match outcome {
        SourcesOutcome::Success(quote) => {
            if let Err(e) = ctx.blacklist.record_success(symbol, data_type).await {
                warn!(
                    target = "kehai::resolver",
                    event = "blacklist_clear_failed",
                    symbol,
                    error = %e,
                );
            }
            if !cancel.is_cancelled()
                && let Err(e) = ctx.cache.set(&key, &quote, ctx.cache.ttl_for(data_type)).await
            {
                warn!(
                    target = "kehai::resolver",
                    event = "cache_write_failed",
                    key = %key,
                    error = %e,
                );
            }
            quote
        }
        SourcesOutcome::Cancelled => default_quote(symbol, data_type, ctx.clock.now()),
        SourcesOutcome::Exhausted { attempted, error } => {
            debug!(
                target = "kehai::resolver",
                event = "exhausted",
                symbol,
                data_type = %data_type,
                error = %error,
            );
            if attempted
                && let Err(e) = ctx
                    .blacklist
                    .record_failure(symbol, data_type, &error.to_string())
                    .await
            {
                warn!(
                    target = "kehai::resolver",
                    event = "blacklist_record_failed",
                    symbol,
                    error = %e,
                );
            }
            synthesize(ctx, data_type, symbol, &key, cancel).await
        }
    }
}

enum SourcesOutcome {
    Success(Quote),
    Cancelled,
    Exhausted { attempted: bool, error: KehaiError },
}

fn exhaustion_error(symbol: &str, data_type: DataType, attempts: Vec<KehaiError>) -> KehaiError {
    if attempts.is_empty() {
        KehaiError::Other(format!("no sources registered for {data_type}"))
    } else {
        KehaiError::AllSourcesFailed {
            symbol: symbol.to_string(),
            attempts,
        }
    }
}

/// Iterate the ordered source list; the first non-error result wins.
async fn resolve_priority(
    ctx: &Context,
    data_type: DataType,
    symbol: &str,
    previous: Option<&Quote>,
    sources: &[Arc<dyn QuoteFetcher>],
    cancel: &CancellationToken,
) -> SourcesOutcome {
    let mut attempts: Vec<KehaiError> = Vec::new();

    for fetcher in sources {
        if ctx
            .pacing
            .acquire(fetcher.id(), data_type, cancel)
            .await
            .is_err()
        {
            return SourcesOutcome::Cancelled;
        }

        match attempt_source(ctx, data_type, symbol, previous, fetcher, cancel).await {
            Ok(quote) => return SourcesOutcome::Success(quote),
            Err(KehaiError::Cancelled) => return SourcesOutcome::Cancelled,
            Err(e) => attempts.push(e),
        }
    }

    SourcesOutcome::Exhausted {
        attempted: !sources.is_empty(),
        error: exhaustion_error(symbol, data_type, attempts),
    }
}

/// Query every source concurrently and keep the median-priced survivor.
async fn resolve_median(
    ctx: &Context,
    data_type: DataType,
    symbol: &str,
    previous: Option<&Quote>,
    sources: &[Arc<dyn QuoteFetcher>],
    cancel: &CancellationToken,
) -> SourcesOutcome {
    let tasks = sources.iter().map(|fetcher| async move {
        if ctx
            .pacing
            .acquire(fetcher.id(), data_type, cancel)
            .await
            .is_err()
        {
            return Err(KehaiError::Cancelled);
        }
        attempt_source(ctx, data_type, symbol, previous, fetcher, cancel).await
    });

    let mut candidates = Vec::new();
    let mut attempts: Vec<KehaiError> = Vec::new();
    for result in join_all(tasks).await {
        match result {
            Ok(quote) => candidates.push(quote),
            Err(KehaiError::Cancelled) => return SourcesOutcome::Cancelled,
            Err(e) => attempts.push(e),
        }
    }

    match ctx.validator.median_pick(candidates) {
        Some((winner, issue)) => {
            if let Some(issue) = issue {
                warn!(
                    target = "kehai::resolver",
                    event = "source_difference",
                    symbol,
                    data_type = %data_type,
                    detail = %issue.detail,
                );
            }
            SourcesOutcome::Success(winner)
        }
        None => SourcesOutcome::Exhausted {
            attempted: !sources.is_empty(),
            error: exhaustion_error(symbol, data_type, attempts),
        },
    }
}

/// One source attempt: retry budget, metrics bookkeeping, validator gate.
async fn attempt_source(
    ctx: &Context,
    data_type: DataType,
    symbol: &str,
    previous: Option<&Quote>,
    fetcher: &Arc<dyn QuoteFetcher>,
    cancel: &CancellationToken,
) -> Result<Quote, KehaiError> {
    let handle = ctx.metrics.begin_attempt(fetcher.id(), data_type);
    let result = fetch_with_retry(fetcher, symbol, &ctx.cfg.retry, &ctx.clock, cancel).await;

    let mut quote = match result {
        Ok(quote) => quote,
        Err(e) => {
            let kind = e.kind().unwrap_or(ErrorKind::Other);
            ctx.metrics.end_attempt(handle, AttemptOutcome::Failure(kind));
            debug!(
                target = "kehai::resolver",
                event = "source_failed",
                source = fetcher.id(),
                symbol,
                error = %e,
            );
            return Err(e);
        }
    };
    // The contract echoes the requested identity back whatever the upstream
    // normalized it to.
    quote.symbol = symbol.to_string();
    quote.data_type = data_type;
    quote.source = fetcher.id().to_string();

    match ctx.validator.assess(previous, &quote) {
        Assessment::Accept => {}
        Assessment::AcceptFlagged(issue) => {
            warn!(
                target = "kehai::resolver",
                event = "validation_flag",
                source = fetcher.id(),
                symbol,
                detail = %issue.detail,
            );
        }
        Assessment::Reject(issue) => {
            ctx.metrics
                .end_attempt(handle, AttemptOutcome::Failure(ErrorKind::Validation));
            if issue.severity == Severity::High {
                ctx.throttle
                    .emit(Alert::new(
                        format!("{symbol}:{data_type}:validation"),
                        AlertSeverity::High,
                        format!("implausible quote for {symbol}"),
                        format!("{} rejected: {}", fetcher.id(), issue.detail),
                    ))
                    .await;
            }
            return Err(KehaiError::source_failure(
                fetcher.id(),
                ErrorKind::Validation,
                issue.detail,
            ));
        }
    }

    ctx.metrics.end_attempt(handle, AttemptOutcome::Success);
    Ok(quote)
}

/// Produce and (unless cancelled) cache a marked default under the short TTL,
/// so the next caller re-attempts soon.
async fn synthesize(
    ctx: &Context,
    data_type: DataType,
    symbol: &str,
    key: &str,
    cancel: &CancellationToken,
) -> Quote {
    let quote = default_quote(symbol, data_type, ctx.clock.now());
    if !cancel.is_cancelled()
        && let Err(e) = ctx.cache.set(key, &quote, ctx.cache.default_quote_ttl()).await
    {
        warn!(
            target = "kehai::resolver",
            event = "default_cache_write_failed",
            key = %key,
            error = %e,
        );
    }
    quote
}
