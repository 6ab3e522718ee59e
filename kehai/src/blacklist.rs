//! Per-symbol failure tracking with cooldowns.
//!
//! Failures are attributed per `(symbol, data type)`, not per source: a
//! symbol that fails across every source goes cold here, while one flaky
//! source across many symbols is the metrics sink's problem. Entries persist
//! through the key-value table so replicas share cooldown state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use kehai_core::clock::Clock;
use kehai_core::store::{KeyValueTable, TableItem};
use kehai_types::{BlacklistConfig, DataType, KehaiError};

const KEY_PREFIX: &str = "BLACKLIST:";

fn entry_key(data_type: DataType, symbol: &str) -> String {
    format!("{KEY_PREFIX}{}:{}", data_type.as_str(), symbol)
}

/// Stored state for one `(symbol, data type)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    /// The tracked symbol.
    pub symbol: String,
    /// The tracked data type.
    pub data_type: DataType,
    /// Consecutive all-source failures observed so far.
    pub consecutive_failures: u32,
    /// When the current failure streak started.
    pub first_failure_at: DateTime<Utc>,
    /// Most recent failure.
    pub last_failure_at: DateTime<Utc>,
    /// Set once the streak crosses the threshold; upstream work is skipped
    /// until this instant passes.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Reason attached to the most recent failure.
    pub last_reason: String,
}

/// The blacklist registry (store-backed).
pub struct BlacklistRegistry {
    store: Arc<dyn KeyValueTable>,
    clock: Arc<dyn Clock>,
    cfg: BlacklistConfig,
}

impl BlacklistRegistry {
    /// Build the registry over a store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueTable>, clock: Arc<dyn Clock>, cfg: BlacklistConfig) -> Self {
        Self { store, clock, cfg }
    }

    async fn read_entry(&self, key: &str) -> Result<Option<BlacklistEntry>, KehaiError> {
        let Some(item) = self.store.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_value(item.value)
            .map(Some)
            .map_err(|e| KehaiError::store(format!("corrupt blacklist entry at {key}: {e}")))
    }

    async fn write_entry(&self, key: &str, entry: &BlacklistEntry) -> Result<(), KehaiError> {
        let item = TableItem {
            key: key.to_string(),
            value: serde_json::to_value(entry)
                .map_err(|e| KehaiError::store(format!("unserializable blacklist entry: {e}")))?,
            expires_at: entry.cooldown_until,
            created_at: self.clock.now(),
        };
        self.store.put(item).await
    }

    /// Remaining cooldown for the pair, when it is cold.
    ///
    /// Store failures read as "not cold": availability wins over precision.
    pub async fn cooldown_remaining(&self, symbol: &str, data_type: DataType) -> Option<Duration> {
        let key = entry_key(data_type, symbol);
        let entry = match self.read_entry(&key).await {
            Ok(e) => e?,
            Err(e) => {
                warn!(
                    target = "kehai::blacklist",
                    event = "read_failed",
                    symbol,
                    error = %e,
                    "treating symbol as not blacklisted"
                );
                return None;
            }
        };
        let until = entry.cooldown_until?;
        let now = self.clock.now();
        (until > now).then(|| (until - now).to_std().unwrap_or_default())
    }

    /// Whether the pair is currently cooling down.
    pub async fn is_cold(&self, symbol: &str, data_type: DataType) -> bool {
        self.cooldown_remaining(symbol, data_type).await.is_some()
    }

    /// Gate for upstream work: `Err(Blacklisted)` while the pair cools down.
    ///
    /// # Errors
    /// `KehaiError::Blacklisted` carrying the remaining cooldown.
    pub async fn ensure_warm(&self, symbol: &str, data_type: DataType) -> Result<(), KehaiError> {
        match self.cooldown_remaining(symbol, data_type).await {
            Some(remaining) => Err(KehaiError::Blacklisted {
                symbol: symbol.to_string(),
                reset_in_ms: u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
            }),
            None => Ok(()),
        }
    }

    /// Record one all-source failure; crossing the threshold starts the
    /// cooldown window.
    ///
    /// # Errors
    /// Surfaces store failures; callers log and carry on.
    pub async fn record_failure(
        &self,
        symbol: &str,
        data_type: DataType,
        reason: &str,
    ) -> Result<(), KehaiError> {
        let key = entry_key(data_type, symbol);
        let now = self.clock.now();
        let mut entry = match self.read_entry(&key).await {
            Ok(Some(entry)) => entry,
            // A fresh streak; an unreadable entry restarts the count.
            Ok(None) | Err(_) => BlacklistEntry {
                symbol: symbol.to_string(),
                data_type,
                consecutive_failures: 0,
                first_failure_at: now,
                last_failure_at: now,
                cooldown_until: None,
                last_reason: String::new(),
            },
        };

        entry.consecutive_failures += 1;
        entry.last_failure_at = now;
        entry.last_reason = reason.to_string();

        let threshold = self.cfg.threshold_for(data_type);
        // A lapsed-but-unswept cooldown re-arms on the next failure, so the
        // invariant cooldown_until = last_failure_at + window holds whenever
        // the streak sits at or past the threshold.
        let needs_arming = entry.consecutive_failures >= threshold
            && entry.cooldown_until.is_none_or(|until| until <= now);
        if needs_arming {
            let window = self.cfg.cooldown_for(data_type);
            entry.cooldown_until = Some(
                chrono::Duration::from_std(window)
                    .ok()
                    .and_then(|delta| now.checked_add_signed(delta))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            );
            info!(
                target = "kehai::blacklist",
                event = "cooldown_start",
                symbol,
                data_type = %data_type,
                failures = entry.consecutive_failures,
                cooldown_secs = window.as_secs(),
                reason,
                "symbol went cold"
            );
        } else {
            debug!(
                target = "kehai::blacklist",
                event = "failure",
                symbol,
                data_type = %data_type,
                failures = entry.consecutive_failures,
                threshold,
                reason,
            );
        }

        self.write_entry(&key, &entry).await
    }

    /// Clear the pair's entry after a successful fetch.
    ///
    /// # Errors
    /// Surfaces store failures; callers log and carry on.
    pub async fn record_success(&self, symbol: &str, data_type: DataType) -> Result<(), KehaiError> {
        self.store.delete(&entry_key(data_type, symbol)).await
    }

    /// Read one entry for inspection.
    ///
    /// # Errors
    /// Surfaces store failures.
    pub async fn entry(
        &self,
        symbol: &str,
        data_type: DataType,
    ) -> Result<Option<BlacklistEntry>, KehaiError> {
        self.read_entry(&entry_key(data_type, symbol)).await
    }

    /// Remove entries whose cooldown has elapsed; returns the number removed.
    ///
    /// # Errors
    /// Surfaces a store failure only when the scan itself fails.
    pub async fn sweep(&self) -> Result<usize, KehaiError> {
        let now = self.clock.now();
        let mut removed = 0;
        for item in self.store.scan_prefix(KEY_PREFIX, None).await? {
            let Ok(entry) = serde_json::from_value::<BlacklistEntry>(item.value) else {
                continue;
            };
            if entry.cooldown_until.is_some_and(|until| until < now) {
                match self.store.delete(&item.key).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(
                        target = "kehai::blacklist",
                        event = "sweep_delete_failed",
                        key = %item.key,
                        error = %e,
                    ),
                }
            }
        }
        Ok(removed)
    }
}
