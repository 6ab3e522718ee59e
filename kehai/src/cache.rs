//! TTL-keyed quote cache over the abstract key-value table.
//!
//! Keys are `"<DATA_TYPE>:<symbol>"`. Expiry is computed by this tier so it
//! holds even when the backing store does not enforce its TTL attribute;
//! expired rows read as absent and stay physical until [`QuoteCache::sweep`]
//! removes them.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use kehai_core::clock::Clock;
use kehai_core::store::{KeyValueTable, TableItem};
use kehai_types::{CacheTtlConfig, DataType, KehaiError, Quote};

/// Deletes are issued in chunks of this size during a sweep.
const SWEEP_BATCH: usize = 25;

/// Cache key for one `(data type, symbol)` pair.
///
/// Exchange-rate symbols are already `"<BASE>-<TARGET>"`, so the same format
/// covers all four data types.
#[must_use]
pub fn cache_key(data_type: DataType, symbol: &str) -> String {
    format!("{}:{}", data_type.as_str(), symbol)
}

/// A cache hit: the stored payload and how long it stays fresh.
#[derive(Debug, Clone)]
pub struct CachedQuote {
    /// The stored payload, with its original producer tag.
    pub quote: Quote,
    /// Time left until the entry expires.
    pub remaining_ttl: Duration,
}

/// The cache tier (store-backed, TTL-keyed, prefix-scannable).
pub struct QuoteCache {
    store: Arc<dyn KeyValueTable>,
    clock: Arc<dyn Clock>,
    ttl: CacheTtlConfig,
}

impl QuoteCache {
    /// Build the cache tier over a store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueTable>, clock: Arc<dyn Clock>, ttl: CacheTtlConfig) -> Self {
        Self { store, clock, ttl }
    }

    /// TTL applied to fresh quotes of the given data type.
    #[must_use]
    pub const fn ttl_for(&self, data_type: DataType) -> Duration {
        self.ttl.ttl_for(data_type)
    }

    /// Short TTL applied to synthesized default quotes.
    #[must_use]
    pub const fn default_quote_ttl(&self) -> Duration {
        self.ttl.default_quote_ttl()
    }

    /// Read one entry. `Ok(None)` when missing or expired.
    ///
    /// # Errors
    /// Surfaces store failures; the resolver treats them as a miss.
    pub async fn get(&self, key: &str) -> Result<Option<CachedQuote>, KehaiError> {
        let Some(item) = self.store.get(key).await? else {
            return Ok(None);
        };
        let now = self.clock.now();
        let Some(expires_at) = item.expires_at else {
            return Ok(None);
        };
        if expires_at <= now {
            return Ok(None);
        }
        let quote: Quote = serde_json::from_value(item.value)
            .map_err(|e| KehaiError::store(format!("corrupt cache payload at {key}: {e}")))?;
        let remaining_ttl = (expires_at - now).to_std().unwrap_or_default();
        Ok(Some(CachedQuote {
            quote,
            remaining_ttl,
        }))
    }

    /// Write one entry with expiry `now + ttl`. Overwrites atomically.
    ///
    /// # Errors
    /// Surfaces store failures.
    pub async fn set(&self, key: &str, quote: &Quote, ttl: Duration) -> Result<(), KehaiError> {
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC);
        let item = TableItem {
            key: key.to_string(),
            value: serde_json::to_value(quote)
                .map_err(|e| KehaiError::store(format!("unserializable quote: {e}")))?,
            expires_at: Some(expires_at),
            created_at: now,
        };
        self.store.put(item).await
    }

    /// Remove one entry.
    ///
    /// # Errors
    /// Surfaces store failures.
    pub async fn delete(&self, key: &str) -> Result<(), KehaiError> {
        self.store.delete(key).await
    }

    /// Scan unexpired entries whose key starts with `prefix`.
    ///
    /// # Errors
    /// Surfaces store failures.
    pub async fn get_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, CachedQuote)>, KehaiError> {
        let now = self.clock.now();
        let mut out = Vec::new();
        for item in self.store.scan_prefix(prefix, None).await? {
            let Some(expires_at) = item.expires_at else {
                continue;
            };
            if expires_at <= now {
                continue;
            }
            match serde_json::from_value::<Quote>(item.value) {
                Ok(quote) => {
                    let remaining_ttl = (expires_at - now).to_std().unwrap_or_default();
                    out.push((
                        item.key,
                        CachedQuote {
                            quote,
                            remaining_ttl,
                        },
                    ));
                }
                Err(e) => {
                    warn!(
                        target = "kehai::cache",
                        event = "skip_corrupt",
                        key = %item.key,
                        error = %e,
                        "skipping unreadable cache payload"
                    );
                }
            }
        }
        Ok(out)
    }

    /// Remove expired entries in bounded batches; returns the number removed.
    ///
    /// Partial failures keep partial progress: a failed delete is logged and
    /// skipped, and the sweep carries on.
    ///
    /// # Errors
    /// Surfaces a store failure only when the initial scan itself fails.
    pub async fn sweep(&self) -> Result<usize, KehaiError> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        for data_type in DataType::ALL {
            let prefix = format!("{}:", data_type.as_str());
            for item in self.store.scan_prefix(&prefix, None).await? {
                if item.expires_at.is_some_and(|at| at <= now) {
                    expired.push(item.key);
                }
            }
        }

        let mut removed = 0;
        for batch in expired.chunks(SWEEP_BATCH) {
            for key in batch {
                match self.store.delete(key).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(
                        target = "kehai::cache",
                        event = "sweep_delete_failed",
                        key = %key,
                        error = %e,
                        "keeping expired entry for the next sweep"
                    ),
                }
            }
        }
        debug!(
            target = "kehai::cache",
            event = "sweep",
            removed,
            "expired entries removed"
        );
        Ok(removed)
    }
}
