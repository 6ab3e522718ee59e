//! Configuration types for the aggregation core.
//!
//! Every struct carries the operational defaults; `KehaiConfig::validate`
//! rejects nonsensical values at build time so the runtime never has to.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{DataType, KehaiError};

/// Exponential backoff configuration for per-source retry delays.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Minimum backoff delay in milliseconds.
    pub min_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Exponential factor to increase delay after each failure (>= 1).
    pub factor: u32,
    /// Random jitter percentage [0, 100] added to each delay.
    pub jitter_percent: u8,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff_ms: 400,
            max_backoff_ms: 5_000,
            factor: 2,
            jitter_percent: 25,
        }
    }
}

/// Retry policy applied to each source attempt inside a resolve call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts against one source, including the first.
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Per-data-type cache TTLs, in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheTtlConfig {
    /// TTL for US equities.
    pub us_stock_secs: u64,
    /// TTL for Japanese equities.
    pub jp_stock_secs: u64,
    /// TTL for Japanese mutual funds.
    pub mutual_fund_secs: u64,
    /// TTL for exchange rates.
    pub exchange_rate_secs: u64,
    /// Short TTL for synthesized default quotes so the next caller re-attempts soon.
    pub default_quote_secs: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            us_stock_secs: 3_600,
            jp_stock_secs: 3_600,
            mutual_fund_secs: 10_800,
            exchange_rate_secs: 21_600,
            default_quote_secs: 300,
        }
    }
}

impl CacheTtlConfig {
    /// TTL for fresh quotes of the given data type.
    #[must_use]
    pub const fn ttl_for(&self, data_type: DataType) -> Duration {
        let secs = match data_type {
            DataType::UsStock => self.us_stock_secs,
            DataType::JpStock => self.jp_stock_secs,
            DataType::MutualFund => self.mutual_fund_secs,
            DataType::ExchangeRate => self.exchange_rate_secs,
        };
        Duration::from_secs(secs)
    }

    /// TTL for synthesized default quotes, regardless of data type.
    #[must_use]
    pub const fn default_quote_ttl(&self) -> Duration {
        Duration::from_secs(self.default_quote_secs)
    }
}

/// Consecutive-failure thresholds and cooldown windows for the blacklist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BlacklistConfig {
    /// Failures before a stock or fund symbol goes cold.
    pub stock_threshold: u32,
    /// Failures before an exchange-rate pair goes cold.
    pub exchange_rate_threshold: u32,
    /// Cooldown window for stocks and funds.
    pub stock_cooldown: Duration,
    /// Cooldown window for exchange rates.
    pub exchange_rate_cooldown: Duration,
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            stock_threshold: 5,
            exchange_rate_threshold: 10,
            stock_cooldown: Duration::from_secs(6 * 60 * 60),
            exchange_rate_cooldown: Duration::from_secs(60 * 60),
        }
    }
}

impl BlacklistConfig {
    /// Consecutive-failure threshold for the given data type.
    #[must_use]
    pub const fn threshold_for(&self, data_type: DataType) -> u32 {
        match data_type {
            DataType::ExchangeRate => self.exchange_rate_threshold,
            _ => self.stock_threshold,
        }
    }

    /// Cooldown window applied once the threshold is crossed.
    #[must_use]
    pub const fn cooldown_for(&self, data_type: DataType) -> Duration {
        match data_type {
            DataType::ExchangeRate => self.exchange_rate_cooldown,
            _ => self.stock_cooldown,
        }
    }
}

/// Worker pool sizing for the batch dispatcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Workers for US equities batches.
    pub us_stock_workers: usize,
    /// Workers for Japanese equities batches.
    pub jp_stock_workers: usize,
    /// Workers for mutual fund batches.
    pub mutual_fund_workers: usize,
    /// Workers for exchange-rate batches.
    pub exchange_rate_workers: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            us_stock_workers: 8,
            jp_stock_workers: 4,
            mutual_fund_workers: 4,
            exchange_rate_workers: 4,
        }
    }
}

impl DispatchConfig {
    /// Worker pool size for batches of the given data type.
    #[must_use]
    pub const fn workers_for(&self, data_type: DataType) -> usize {
        match data_type {
            DataType::UsStock => self.us_stock_workers,
            DataType::JpStock => self.jp_stock_workers,
            DataType::MutualFund => self.mutual_fund_workers,
            DataType::ExchangeRate => self.exchange_rate_workers,
        }
    }
}

/// Rate-limit override for one `(source, data type)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitOverride {
    /// Source id the override applies to.
    pub source_id: String,
    /// Data type the override applies to.
    pub data_type: DataType,
    /// Sustained tokens per second.
    pub qps: f64,
    /// Bucket capacity (burst).
    pub burst: u32,
}

/// Token-bucket pacing configuration, keyed by `(source, data type)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained tokens per second when no override matches.
    pub default_qps: f64,
    /// Bucket capacity when no override matches.
    pub default_burst: u32,
    /// Per-(source, data type) overrides.
    pub overrides: Vec<RateLimitOverride>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_qps: 5.0,
            default_burst: 5,
            overrides: Vec::new(),
        }
    }
}

impl RateLimitConfig {
    /// `(qps, burst)` effective for the given source and data type.
    #[must_use]
    pub fn limit_for(&self, source_id: &str, data_type: DataType) -> (f64, u32) {
        self.overrides
            .iter()
            .find(|o| o.source_id == source_id && o.data_type == data_type)
            .map_or((self.default_qps, self.default_burst), |o| {
                (o.qps, o.burst)
            })
    }
}

/// Reasonableness-check thresholds for freshly fetched quotes.
///
/// Jump thresholds are percentages compared against the last cached payload
/// for the same key; `divergence` bounds max/min spread in median mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Master switch for the quality gate.
    pub enabled: bool,
    /// |changePercent| above which a stock quote is flagged MEDIUM.
    pub stock_medium_jump: Decimal,
    /// |changePercent| above which a stock quote is flagged HIGH.
    pub stock_high_jump: Decimal,
    /// MEDIUM threshold for mutual funds.
    pub fund_medium_jump: Decimal,
    /// HIGH threshold for mutual funds.
    pub fund_high_jump: Decimal,
    /// MEDIUM threshold for exchange rates.
    pub rate_medium_jump: Decimal,
    /// HIGH threshold for exchange rates.
    pub rate_high_jump: Decimal,
    /// Max/min divergence (percent) tolerated across sources in median mode.
    pub stock_divergence: Decimal,
    /// Divergence bound for mutual funds.
    pub fund_divergence: Decimal,
    /// Divergence bound for exchange rates.
    pub rate_divergence: Decimal,
    /// Data types resolved by querying all sources and taking the median.
    pub median_sources: Vec<DataType>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stock_medium_jump: Decimal::from(25),
            stock_high_jump: Decimal::from(50),
            fund_medium_jump: Decimal::from(10),
            fund_high_jump: Decimal::from(20),
            rate_medium_jump: Decimal::from(5),
            rate_high_jump: Decimal::from(10),
            stock_divergence: Decimal::from(5),
            fund_divergence: Decimal::from(3),
            rate_divergence: Decimal::ONE,
            median_sources: Vec::new(),
        }
    }
}

impl ValidatorConfig {
    /// `(medium, high)` jump thresholds for the given data type.
    #[must_use]
    pub fn jump_thresholds_for(&self, data_type: DataType) -> (Decimal, Decimal) {
        match data_type {
            DataType::UsStock | DataType::JpStock => (self.stock_medium_jump, self.stock_high_jump),
            DataType::MutualFund => (self.fund_medium_jump, self.fund_high_jump),
            DataType::ExchangeRate => (self.rate_medium_jump, self.rate_high_jump),
        }
    }

    /// Divergence bound for median mode.
    #[must_use]
    pub fn divergence_for(&self, data_type: DataType) -> Decimal {
        match data_type {
            DataType::UsStock | DataType::JpStock => self.stock_divergence,
            DataType::MutualFund => self.fund_divergence,
            DataType::ExchangeRate => self.rate_divergence,
        }
    }

    /// Whether the given data type resolves via median-of-sources.
    #[must_use]
    pub fn median_mode_for(&self, data_type: DataType) -> bool {
        self.median_sources.contains(&data_type)
    }
}

/// Hot sets and cadence for the pre-warm & sweep scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrewarmConfig {
    /// Interval between scheduler ticks.
    pub interval: Duration,
    /// Symbols kept warm per data type.
    pub hot_sets: HashMap<DataType, Vec<String>>,
}

impl Default for PrewarmConfig {
    fn default() -> Self {
        let mut hot_sets = HashMap::new();
        hot_sets.insert(
            DataType::UsStock,
            [
                "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "BRK-B", "JPM", "V",
            ]
            .map(str::to_string)
            .to_vec(),
        );
        hot_sets.insert(
            DataType::JpStock,
            [
                "7203", "6758", "9432", "8306", "6861", "9984", "6098", "8035", "4063", "9983",
            ]
            .map(str::to_string)
            .to_vec(),
        );
        hot_sets.insert(
            DataType::MutualFund,
            ["0131103C", "03311187", "9C311125", "89311199", "0331418A"]
                .map(str::to_string)
                .to_vec(),
        );
        hot_sets.insert(
            DataType::ExchangeRate,
            ["USD-JPY", "EUR-JPY", "GBP-JPY", "AUD-JPY", "EUR-USD"]
                .map(str::to_string)
                .to_vec(),
        );
        Self {
            interval: Duration::from_secs(60 * 60),
            hot_sets,
        }
    }
}

impl PrewarmConfig {
    /// Hot set for the given data type (empty when none configured).
    #[must_use]
    pub fn hot_set_for(&self, data_type: DataType) -> &[String] {
        self.hot_sets.get(&data_type).map_or(&[], Vec::as_slice)
    }
}

/// Alert dedup window and batch failure-rate thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Window within which a repeated alert key is suppressed.
    pub dedup_window: Duration,
    /// Fraction of defaulted jobs above which a batch raises an alert.
    pub batch_failure_threshold: f64,
    /// Minimum batch size before the failure-rate alert applies.
    pub min_batch_for_alert: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(30 * 60),
            batch_failure_threshold: 0.2,
            min_batch_for_alert: 10,
        }
    }
}

/// Cadence and thresholds for the metrics-driven priority reorder task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReorderConfig {
    /// Interval between evaluation cycles.
    pub interval: Duration,
    /// Minimum attempts in a window before a source is judged.
    pub min_samples: u64,
    /// Success rate above which a source is promoted one position.
    pub promote_success_rate: f64,
    /// Average latency must also stay below this to promote.
    pub promote_max_avg_latency_ms: u64,
    /// Success rate below which a source is demoted one position.
    pub demote_success_rate: f64,
}

impl Default for ReorderConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            min_samples: 10,
            promote_success_rate: 0.95,
            promote_max_avg_latency_ms: 2_000,
            demote_success_rate: 0.60,
        }
    }
}

/// Aggregate configuration for the composition root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KehaiConfig {
    /// Cache TTLs.
    pub ttl: CacheTtlConfig,
    /// Per-source retry policy.
    pub retry: RetryConfig,
    /// Blacklist thresholds and cooldowns.
    pub blacklist: BlacklistConfig,
    /// Worker pool sizing.
    pub dispatch: DispatchConfig,
    /// Token-bucket pacing.
    pub rate_limit: RateLimitConfig,
    /// Quote reasonableness checks.
    pub validator: ValidatorConfig,
    /// Pre-warm cadence and hot sets.
    pub prewarm: PrewarmConfig,
    /// Alerting thresholds.
    pub alerts: AlertConfig,
    /// Priority reorder cadence and thresholds.
    pub reorder: ReorderConfig,
}

impl KehaiConfig {
    /// Reject configurations the runtime cannot operate under.
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<(), KehaiError> {
        let ttls = [
            ("ttl.us_stock_secs", self.ttl.us_stock_secs),
            ("ttl.jp_stock_secs", self.ttl.jp_stock_secs),
            ("ttl.mutual_fund_secs", self.ttl.mutual_fund_secs),
            ("ttl.exchange_rate_secs", self.ttl.exchange_rate_secs),
            ("ttl.default_quote_secs", self.ttl.default_quote_secs),
        ];
        for (name, secs) in ttls {
            if secs == 0 {
                return Err(KehaiError::InvalidConfig(format!("{name} must be > 0")));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(KehaiError::InvalidConfig(
                "retry.max_attempts must be >= 1".to_string(),
            ));
        }
        if self.retry.backoff.factor == 0 {
            return Err(KehaiError::InvalidConfig(
                "retry.backoff.factor must be >= 1".to_string(),
            ));
        }
        if self.retry.backoff.min_backoff_ms > self.retry.backoff.max_backoff_ms {
            return Err(KehaiError::InvalidConfig(
                "retry.backoff.min_backoff_ms must not exceed max_backoff_ms".to_string(),
            ));
        }
        if self.retry.backoff.jitter_percent > 100 {
            return Err(KehaiError::InvalidConfig(
                "retry.backoff.jitter_percent must be within [0, 100]".to_string(),
            ));
        }

        for data_type in DataType::ALL {
            if self.dispatch.workers_for(data_type) == 0 {
                return Err(KehaiError::InvalidConfig(format!(
                    "dispatch workers for {data_type} must be > 0"
                )));
            }
        }

        if self.rate_limit.default_qps <= 0.0 || self.rate_limit.default_burst == 0 {
            return Err(KehaiError::InvalidConfig(
                "rate_limit defaults must be positive".to_string(),
            ));
        }
        for o in &self.rate_limit.overrides {
            if o.qps <= 0.0 || o.burst == 0 {
                return Err(KehaiError::InvalidConfig(format!(
                    "rate_limit override for {}/{} must be positive",
                    o.source_id, o.data_type
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.alerts.batch_failure_threshold) {
            return Err(KehaiError::InvalidConfig(
                "alerts.batch_failure_threshold must be within [0, 1]".to_string(),
            ));
        }

        if self.reorder.min_samples == 0 {
            return Err(KehaiError::InvalidConfig(
                "reorder.min_samples must be >= 1".to_string(),
            ));
        }
        for (name, rate) in [
            ("reorder.promote_success_rate", self.reorder.promote_success_rate),
            ("reorder.demote_success_rate", self.reorder.demote_success_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(KehaiError::InvalidConfig(format!(
                    "{name} must be within [0, 1]"
                )));
            }
        }

        if self.prewarm.interval.is_zero() {
            return Err(KehaiError::InvalidConfig(
                "prewarm.interval must be > 0".to_string(),
            ));
        }
        if self.reorder.interval.is_zero() {
            return Err(KehaiError::InvalidConfig(
                "reorder.interval must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
