//! Kehai resolves price snapshots across multiple upstream market-data
//! sources.
//!
//! Overview
//! - Four data types: US equities, Japanese equities, Japanese mutual funds,
//!   and currency exchange rates; one normalized [`Quote`] per symbol.
//! - A store-backed cache tier answers fresh symbols without upstream work.
//! - The resolver walks an ordered, metrics-reordered source list per data
//!   type; each attempt carries its own retry budget with jittered backoff.
//! - Symbols that keep failing across all sources go cold in a blacklist and
//!   skip upstream work for a cooldown window.
//! - The batch dispatcher fans out over a bounded worker pool with
//!   per-(source, data type) token-bucket pacing, duplicate coalescing, and
//!   deadline/cancel handling.
//! - Every failure path degrades to a marked default quote; callers never
//!   see a resolution error.
//!
//! Key behaviors and trade-offs
//! - Availability over freshness: store failures read as cache misses, and a
//!   defaulted symbol is cached under a short TTL so the next caller retries
//!   soon.
//! - Blacklisting is per symbol; a single flaky source is handled by the
//!   metrics-driven priority reorder instead.
//! - The pre-warm scheduler keeps small hot sets cached and sweeps expired
//!   entries; ticks are single-flight and never queue up.
#![warn(missing_docs)]

/// Alert dedup / throttling in front of the injected sink.
pub mod alerts;
/// Store-backed per-symbol blacklist with cooldowns.
pub mod blacklist;
/// TTL-keyed quote cache over the abstract key-value table.
pub mod cache;
/// Batch fan-out over a bounded worker pool.
pub mod dispatch;
/// Degraded-default quote synthesis.
pub mod fallback;
/// Per-source counters and reorder decisions.
pub mod metrics;
mod pacing;
/// Ordered source registry with atomically swapped priority lists.
pub mod registry;
mod resolver;
mod retry;
/// Periodic pre-warm & sweep loop.
pub mod scheduler;
mod service;
/// Reasonableness checks on freshly fetched quotes.
pub mod validator;

pub use dispatch::BatchOptions;
pub use scheduler::PrewarmSummary;
pub use service::{Kehai, KehaiBuilder};

pub use kehai_core::alert::{Alert, AlertSeverity, AlertSink, NullAlertSink};
pub use kehai_core::clock::{Clock, SystemClock};
pub use kehai_core::fetcher::QuoteFetcher;
pub use kehai_core::store::{KeyValueTable, TableItem};
pub use kehai_core::task::TaskHandle;

// Re-export the data model for convenience.
pub use kehai_types::{
    CACHE_SOURCE, DEFAULT_SOURCE, DataType, ErrorKind, KehaiConfig, KehaiError, Quote,
};
pub use tokio_util::sync::CancellationToken;
