//! Deterministic test doubles for the kehai aggregation core: scripted and
//! dynamic mock fetchers, an in-memory key-value table, a recording alert
//! sink, and a manually driven clock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;

use kehai_core::fetcher::QuoteFetcher;
use kehai_core::{DataType, KehaiError, Quote};

mod alert;
mod clock;
mod dynamic;
mod store;

pub use alert::RecordingAlertSink;
pub use clock::ManualClock;
pub use dynamic::{DynamicMockFetcher, FetchBehavior, MockFetcherController};
pub use store::MemoryTable;

/// Deterministic quote fixture for one symbol.
///
/// Prices derive from the symbol bytes so distinct symbols get distinct but
/// stable values; `last_updated` is pinned so payload comparisons are exact.
#[must_use]
pub fn quote_fixture(symbol: &str, data_type: DataType, source: &str) -> Quote {
    let seed: u32 = symbol.bytes().map(u32::from).sum();
    let price = Decimal::new(i64::from(seed % 900 + 100), 1);
    Quote {
        symbol: symbol.to_string(),
        data_type,
        price,
        change: Decimal::new(5, 1),
        change_percent: Decimal::new(12, 1),
        currency: data_type.default_currency().to_string(),
        name: symbol.to_string(),
        last_updated: Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap(),
        source: source.to_string(),
        is_default: false,
        price_label: None,
        base: None,
        target: None,
        pair: None,
    }
}

/// Scripted mock fetcher.
///
/// Answers every symbol with a fixture quote unless a per-symbol script says
/// otherwise, and counts fetch calls per symbol for assertions.
pub struct MockFetcher {
    id: &'static str,
    data_type: DataType,
    priority: u32,
    scripts: Mutex<HashMap<String, Result<Quote, KehaiError>>>,
    calls: Mutex<HashMap<String, usize>>,
    total_calls: AtomicUsize,
}

impl MockFetcher {
    /// Create a fetcher answering with fixtures for every symbol.
    #[must_use]
    pub fn new(id: &'static str, data_type: DataType) -> Self {
        Self {
            id,
            data_type,
            priority: 100,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            total_calls: AtomicUsize::new(0),
        }
    }

    /// Override the default priority (lower is consulted first).
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Script a fixed successful quote for one symbol.
    #[must_use]
    pub fn with_quote(self, symbol: &str, quote: Quote) -> Self {
        self.scripts
            .lock()
            .expect("mutex poisoned")
            .insert(symbol.to_string(), Ok(quote));
        self
    }

    /// Script a fixed error for one symbol.
    #[must_use]
    pub fn with_error(self, symbol: &str, err: KehaiError) -> Self {
        self.scripts
            .lock()
            .expect("mutex poisoned")
            .insert(symbol.to_string(), Err(err));
        self
    }

    /// Number of fetch calls observed for one symbol.
    #[must_use]
    pub fn calls_for(&self, symbol: &str) -> usize {
        self.calls
            .lock()
            .expect("mutex poisoned")
            .get(symbol)
            .copied()
            .unwrap_or(0)
    }

    /// Total fetch calls observed across all symbols.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl QuoteFetcher for MockFetcher {
    fn id(&self) -> &'static str {
        self.id
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn default_priority(&self) -> u32 {
        self.priority
    }

    async fn fetch(&self, symbol: &str) -> Result<Quote, KehaiError> {
        *self
            .calls
            .lock()
            .expect("mutex poisoned")
            .entry(symbol.to_string())
            .or_insert(0) += 1;
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let scripted = self
            .scripts
            .lock()
            .expect("mutex poisoned")
            .get(symbol)
            .cloned();
        match scripted {
            Some(outcome) => outcome,
            None => Ok(quote_fixture(symbol, self.data_type, self.id)),
        }
    }
}
