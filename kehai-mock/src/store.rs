use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use kehai_core::store::{KeyValueTable, TableItem};
use kehai_core::KehaiError;

/// In-memory [`KeyValueTable`] with ordered prefix scans.
///
/// Rows persist until deleted; expiry is interpreted by readers, matching a
/// backend whose server-side TTL is not enforced promptly. Failure switches
/// let tests simulate an unavailable store.
#[derive(Default)]
pub struct MemoryTable {
    rows: Mutex<BTreeMap<String, TableItem>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    get_calls: AtomicUsize,
}

impl MemoryTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `get`/`scan_prefix` calls fail.
    pub fn fail_reads(&self, yes: bool) {
        self.fail_reads.store(yes, Ordering::SeqCst);
    }

    /// Make subsequent `put`/`delete` calls fail.
    pub fn fail_writes(&self, yes: bool) {
        self.fail_writes.store(yes, Ordering::SeqCst);
    }

    /// Number of `get` calls observed.
    #[must_use]
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Number of rows currently stored (expired rows included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().expect("mutex poisoned").len()
    }

    /// Whether the table holds no rows at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw row access for assertions.
    #[must_use]
    pub fn raw_get(&self, key: &str) -> Option<TableItem> {
        self.rows.lock().expect("mutex poisoned").get(key).cloned()
    }
}

#[async_trait]
impl KeyValueTable for MemoryTable {
    async fn get(&self, key: &str) -> Result<Option<TableItem>, KehaiError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(KehaiError::store("simulated read failure"));
        }
        Ok(self.rows.lock().expect("mutex poisoned").get(key).cloned())
    }

    async fn put(&self, item: TableItem) -> Result<(), KehaiError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KehaiError::store("simulated write failure"));
        }
        self.rows
            .lock()
            .expect("mutex poisoned")
            .insert(item.key.clone(), item);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KehaiError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KehaiError::store("simulated write failure"));
        }
        self.rows.lock().expect("mutex poisoned").remove(key);
        Ok(())
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
        limit: Option<usize>,
    ) -> Result<Vec<TableItem>, KehaiError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(KehaiError::store("simulated read failure"));
        }
        let rows = self.rows.lock().expect("mutex poisoned");
        let iter = rows
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(_, v)| v.clone());
        Ok(match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        })
    }
}
