use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use kehai_core::backoff::BackoffSchedule;
use kehai_core::clock::Clock;
use kehai_core::fetcher::QuoteFetcher;
use kehai_types::{KehaiError, Quote, RetryConfig};

/// Drive one source through its retry budget for one symbol.
///
/// Retries only transient failures (timeout, network, rate limit), sleeping
/// an exponentially growing, jittered delay between attempts and honoring an
/// upstream `Retry-After` hint when present. Terminal failures (not-found,
/// validation) and budget exhaustion return the last error; cancellation is
/// observed at every suspension point.
pub(crate) async fn fetch_with_retry(
    fetcher: &Arc<dyn QuoteFetcher>,
    symbol: &str,
    cfg: &RetryConfig,
    clock: &Arc<dyn Clock>,
    cancel: &CancellationToken,
) -> Result<Quote, KehaiError> {
    let schedule = BackoffSchedule::new(cfg.backoff);
    let max_attempts = cfg.max_attempts.max(1);

    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(KehaiError::Cancelled);
        }

        let outcome = tokio::select! {
            () = cancel.cancelled() => Err(KehaiError::Cancelled),
            res = fetcher.fetch(symbol) => res,
        };

        let err = match outcome {
            Ok(quote) => return Ok(quote),
            Err(e @ KehaiError::Cancelled) => return Err(e),
            Err(e) => e,
        };

        attempt += 1;
        if attempt >= max_attempts || !err.is_transient() {
            return Err(err);
        }

        let retry_after = match &err {
            KehaiError::Source { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        };
        let delay = schedule.delay(attempt - 1, retry_after);
        debug!(
            target = "kehai::retry",
            event = "backoff",
            source = fetcher.id(),
            symbol,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "transient failure, retrying"
        );
        tokio::select! {
            () = cancel.cancelled() => return Err(KehaiError::Cancelled),
            () = clock.sleep(delay) => {}
        }
    }
}
