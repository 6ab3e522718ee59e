//! Composition root: wires the store, sources, alert sink, and clock into
//! the acquisition pipeline and exposes the public quote API.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::oneshot;
use tracing::info;

use kehai_core::alert::{AlertSink, NullAlertSink};
use kehai_core::clock::{Clock, SystemClock};
use kehai_core::fetcher::QuoteFetcher;
use kehai_core::store::KeyValueTable;
use kehai_core::task::TaskHandle;
use kehai_types::{DataType, KehaiConfig, KehaiError, Quote};

use crate::alerts::AlertThrottle;
use crate::blacklist::BlacklistRegistry;
use crate::cache::{QuoteCache, cache_key};
use crate::dispatch::{BatchOptions, dispatch};
use crate::metrics::{MetricsSink, SourceCounters};
use crate::pacing::PacingGate;
use crate::registry::SourceRegistry;
use crate::scheduler::{PrewarmSummary, run_prewarm_once};
use crate::validator::QuoteValidator;

/// Shared state behind one `Kehai` instance.
pub(crate) struct Context {
    pub(crate) cfg: KehaiConfig,
    pub(crate) cache: QuoteCache,
    pub(crate) blacklist: BlacklistRegistry,
    pub(crate) registry: SourceRegistry,
    pub(crate) metrics: MetricsSink,
    pub(crate) pacing: PacingGate,
    pub(crate) throttle: AlertThrottle,
    pub(crate) validator: QuoteValidator,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) prewarm_running: AtomicBool,
}

/// The aggregation service: resolves price snapshots across ordered upstream
/// sources with a cache tier, per-symbol blacklist, pacing, and degraded
/// defaults.
#[derive(Clone)]
pub struct Kehai {
    ctx: Arc<Context>,
}

impl std::fmt::Debug for Kehai {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kehai").finish_non_exhaustive()
    }
}

/// Builder for constructing a [`Kehai`] service with custom wiring.
pub struct KehaiBuilder {
    fetchers: Vec<Arc<dyn QuoteFetcher>>,
    store: Option<Arc<dyn KeyValueTable>>,
    blacklist_store: Option<Arc<dyn KeyValueTable>>,
    alert_sink: Option<Arc<dyn AlertSink>>,
    clock: Option<Arc<dyn Clock>>,
    cfg: KehaiConfig,
}

impl Default for KehaiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KehaiBuilder {
    /// Create a builder with default configuration and no wiring.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fetchers: Vec::new(),
            store: None,
            blacklist_store: None,
            alert_sink: None,
            clock: None,
            cfg: KehaiConfig::default(),
        }
    }

    /// Register an upstream source. Registration order breaks priority ties.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn QuoteFetcher>) -> Self {
        self.fetchers.push(fetcher);
        self
    }

    /// Table backing the quote cache (required).
    #[must_use]
    pub fn store(mut self, store: Arc<dyn KeyValueTable>) -> Self {
        self.store = Some(store);
        self
    }

    /// Table backing the blacklist; defaults to the cache table.
    #[must_use]
    pub fn blacklist_store(mut self, store: Arc<dyn KeyValueTable>) -> Self {
        self.blacklist_store = Some(store);
        self
    }

    /// Sink receiving throttled alerts; defaults to a drop-everything sink.
    #[must_use]
    pub fn alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sink = Some(sink);
        self
    }

    /// Time source; defaults to the system clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, cfg: KehaiConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Build the service.
    ///
    /// # Errors
    /// - `InvalidConfig` when the configuration fails validation.
    /// - `InvalidArg` when no store or no fetcher has been registered.
    pub fn build(self) -> Result<Kehai, KehaiError> {
        self.cfg.validate()?;

        let store = self.store.ok_or_else(|| {
            KehaiError::InvalidArg("no store registered; add one via store(...)".to_string())
        })?;
        if self.fetchers.is_empty() {
            return Err(KehaiError::InvalidArg(
                "no fetchers registered; add at least one via with_fetcher(...)".to_string(),
            ));
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let alert_sink: Arc<dyn AlertSink> =
            self.alert_sink.unwrap_or_else(|| Arc::new(NullAlertSink));
        let blacklist_store = self.blacklist_store.unwrap_or_else(|| Arc::clone(&store));

        let ctx = Context {
            cache: QuoteCache::new(Arc::clone(&store), Arc::clone(&clock), self.cfg.ttl),
            blacklist: BlacklistRegistry::new(
                blacklist_store,
                Arc::clone(&clock),
                self.cfg.blacklist,
            ),
            registry: SourceRegistry::new(self.fetchers),
            metrics: MetricsSink::new(),
            pacing: PacingGate::new(self.cfg.rate_limit.clone()),
            throttle: AlertThrottle::new(
                alert_sink,
                Arc::clone(&clock),
                self.cfg.alerts.dedup_window,
            ),
            validator: QuoteValidator::new(self.cfg.validator.clone()),
            clock,
            prewarm_running: AtomicBool::new(false),
            cfg: self.cfg,
        };

        Ok(Kehai { ctx: Arc::new(ctx) })
    }
}

fn validated_symbols(symbols: &[&str]) -> Result<Vec<String>, KehaiError> {
    symbols
        .iter()
        .map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Err(KehaiError::InvalidArg("blank symbol".to_string()))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}

fn validated_currency(code: &str) -> Result<String, KehaiError> {
    let trimmed = code.trim();
    if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(trimmed.to_ascii_uppercase())
    } else {
        Err(KehaiError::InvalidArg(format!(
            "not a currency code: {code:?}"
        )))
    }
}

impl Kehai {
    /// Start building a service instance.
    #[must_use]
    pub fn builder() -> KehaiBuilder {
        KehaiBuilder::new()
    }

    /// Fetch quotes for a batch of symbols.
    ///
    /// The result holds exactly one entry per unique input symbol; symbols no
    /// source could serve carry a marked default. Per-symbol failures never
    /// fail the batch.
    ///
    /// # Errors
    /// Only for invalid input (blank symbols); resolution never errors.
    pub async fn get_quotes(
        &self,
        data_type: DataType,
        symbols: &[&str],
        refresh: bool,
    ) -> Result<HashMap<String, Quote>, KehaiError> {
        self.get_quotes_with(data_type, symbols, refresh, BatchOptions::default())
            .await
    }

    /// [`get_quotes`](Self::get_quotes) with an explicit deadline and cancel
    /// signal.
    ///
    /// # Errors
    /// Only for invalid input (blank symbols).
    pub async fn get_quotes_with(
        &self,
        data_type: DataType,
        symbols: &[&str],
        refresh: bool,
        opts: BatchOptions,
    ) -> Result<HashMap<String, Quote>, KehaiError> {
        let symbols = validated_symbols(symbols)?;
        Ok(dispatch(&self.ctx, data_type, &symbols, refresh, opts).await)
    }

    /// Fetch one quote. Convenience over the batch entry point.
    ///
    /// # Errors
    /// Only for invalid input (blank symbol).
    pub async fn get_quote(
        &self,
        data_type: DataType,
        symbol: &str,
        refresh: bool,
    ) -> Result<Quote, KehaiError> {
        let mut results = self.get_quotes(data_type, &[symbol], refresh).await?;
        results
            .remove(symbol.trim())
            .ok_or_else(|| KehaiError::not_found(format!("quote for {symbol}")))
    }

    /// Fetch one exchange rate by currency pair.
    ///
    /// # Errors
    /// `InvalidArg` when either side is not a three-letter currency code.
    pub async fn get_exchange_rate(
        &self,
        base: &str,
        target: &str,
        refresh: bool,
    ) -> Result<Quote, KehaiError> {
        let base = validated_currency(base)?;
        let target = validated_currency(target)?;
        self.get_quote(DataType::ExchangeRate, &format!("{base}-{target}"), refresh)
            .await
    }

    /// Run one pre-warm & sweep pass now.
    ///
    /// Returns a summary with `skipped = true` when a pass is already
    /// running.
    pub async fn pre_warm(&self) -> PrewarmSummary {
        run_prewarm_once(&self.ctx).await
    }

    /// Remove cache entries for the given symbols. Blacklist state is
    /// untouched, so cooldowns keep their meaning.
    ///
    /// # Errors
    /// Surfaces the first store failure; earlier deletes stay applied.
    pub async fn invalidate(
        &self,
        data_type: DataType,
        symbols: &[&str],
    ) -> Result<(), KehaiError> {
        for symbol in validated_symbols(symbols)? {
            self.ctx.cache.delete(&cache_key(data_type, &symbol)).await?;
        }
        Ok(())
    }

    /// Spawn the periodic pre-warm & sweep loop.
    #[must_use]
    pub fn spawn_scheduler(&self) -> TaskHandle {
        crate::scheduler::spawn(Arc::clone(&self.ctx))
    }

    /// Spawn the periodic source-priority reorder loop.
    #[must_use]
    pub fn spawn_reorder_loop(&self) -> TaskHandle {
        let ctx = Arc::clone(&self.ctx);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let interval = ctx.cfg.reorder.interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => apply_reorder(&ctx),
                }
            }
        });
        TaskHandle::new(task, stop_tx)
    }

    /// Run one reorder evaluation cycle now.
    pub fn evaluate_sources(&self) {
        apply_reorder(&self.ctx);
    }

    /// Current source order for one data type.
    #[must_use]
    pub fn source_order(&self, data_type: DataType) -> Vec<&'static str> {
        self.ctx.registry.order_for(data_type)
    }

    /// Lifetime counters for one `(source, data type)` pair.
    #[must_use]
    pub fn source_counters(&self, source_id: &str, data_type: DataType) -> SourceCounters {
        self.ctx.metrics.counters(source_id, data_type)
    }
}

fn apply_reorder(ctx: &Context) {
    let decisions = ctx.metrics.evaluate(&ctx.cfg.reorder);
    for d in &decisions {
        ctx.registry.reorder(d.data_type, &d.source_id, d.delta);
    }
    if !decisions.is_empty() {
        info!(
            target = "kehai::service",
            event = "reorder_applied",
            moves = decisions.len(),
        );
    }
}
