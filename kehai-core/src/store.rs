use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kehai_types::KehaiError;

/// One row of a key-value table.
///
/// `expires_at` is advisory to the store (some backends enforce TTL
/// server-side); readers must still treat expired-but-present rows as absent,
/// and the cache tier's sweep removes them when the store does not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableItem {
    /// Primary string key.
    pub key: String,
    /// Opaque JSON payload.
    pub value: serde_json::Value,
    /// Physical expiry instant, if any.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

/// Abstract key-value table with prefix scans.
///
/// The orchestrator requires atomic per-key put/delete from implementations;
/// given that, no in-process lock is layered on top. Scans return raw rows,
/// including expired ones.
#[async_trait]
pub trait KeyValueTable: Send + Sync {
    /// Read one row by key. `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<TableItem>, KehaiError>;

    /// Write one row, overwriting any previous value atomically.
    async fn put(&self, item: TableItem) -> Result<(), KehaiError>;

    /// Remove one row. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), KehaiError>;

    /// Scan rows whose key starts with `prefix`, up to `limit` when given.
    async fn scan_prefix(
        &self,
        prefix: &str,
        limit: Option<usize>,
    ) -> Result<Vec<TableItem>, KehaiError>;
}
