use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kehai::cache::{QuoteCache, cache_key};
use kehai::{AlertSink, Clock, DataType, Kehai, KeyValueTable, QuoteFetcher};
use kehai_mock::{
    DynamicMockFetcher, FetchBehavior, ManualClock, MemoryTable, MockFetcher, RecordingAlertSink,
    quote_fixture,
};
use kehai_types::{ErrorKind, KehaiConfig, KehaiError};

fn prewarm_config(hot: &[(&str, DataType)]) -> KehaiConfig {
    let mut hot_sets: HashMap<DataType, Vec<String>> = HashMap::new();
    for (symbol, data_type) in hot {
        hot_sets
            .entry(*data_type)
            .or_default()
            .push((*symbol).to_string());
    }
    let mut cfg = KehaiConfig::default();
    cfg.prewarm.hot_sets = hot_sets;
    cfg
}

#[tokio::test]
async fn one_tick_sweeps_and_refreshes_the_hot_sets() {
    let store = Arc::new(MemoryTable::new());
    let clock = Arc::new(ManualClock::new());
    let yahoo = Arc::new(MockFetcher::new("yahoo", DataType::UsStock));
    let fx = Arc::new(MockFetcher::new("fx-api", DataType::ExchangeRate));

    // Seed an already-expired row for the sweep to collect.
    let cache = QuoteCache::new(
        Arc::clone(&store) as Arc<dyn KeyValueTable>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        KehaiConfig::default().ttl,
    );
    let stale = quote_fixture("OLD", DataType::UsStock, "yahoo");
    cache
        .set(&cache_key(DataType::UsStock, "OLD"), &stale, Duration::from_secs(1))
        .await
        .expect("seed ok");
    clock.advance(Duration::from_secs(2));

    let service = Kehai::builder()
        .store(Arc::clone(&store) as Arc<dyn KeyValueTable>)
        .clock(Arc::clone(&clock) as Arc<dyn Clock>)
        .with_fetcher(Arc::clone(&yahoo) as Arc<dyn QuoteFetcher>)
        .with_fetcher(Arc::clone(&fx) as Arc<dyn QuoteFetcher>)
        .config(prewarm_config(&[
            ("AAPL", DataType::UsStock),
            ("MSFT", DataType::UsStock),
            ("USD-JPY", DataType::ExchangeRate),
        ]))
        .build()
        .expect("service builds");

    let summary = service.pre_warm().await;
    assert!(!summary.skipped);
    assert_eq!(summary.swept_cache, 1);
    assert_eq!(summary.refreshed, 3);
    assert_eq!(summary.defaulted, 0);

    assert!(store.raw_get(&cache_key(DataType::UsStock, "AAPL")).is_some());
    assert!(store.raw_get(&cache_key(DataType::UsStock, "MSFT")).is_some());
    assert!(
        store
            .raw_get(&cache_key(DataType::ExchangeRate, "USD-JPY"))
            .is_some()
    );
    assert!(store.raw_get(&cache_key(DataType::UsStock, "OLD")).is_none());
}

#[tokio::test]
async fn degraded_prewarm_raises_a_warning() {
    let store = Arc::new(MemoryTable::new());
    let clock = Arc::new(ManualClock::new());
    let alerts = Arc::new(RecordingAlertSink::new());
    let (broken, ctl) = DynamicMockFetcher::new("broken", DataType::UsStock, 10);
    for symbol in ["AAPL", "MSFT"] {
        ctl.set_behavior(
            symbol,
            FetchBehavior::Fail(KehaiError::source_failure(
                "broken",
                ErrorKind::NotFound,
                "symbol not found",
            )),
        )
        .await;
    }

    let service = Kehai::builder()
        .store(Arc::clone(&store) as Arc<dyn KeyValueTable>)
        .clock(Arc::clone(&clock) as Arc<dyn Clock>)
        .alert_sink(Arc::clone(&alerts) as Arc<dyn AlertSink>)
        .with_fetcher(broken as Arc<dyn QuoteFetcher>)
        .config(prewarm_config(&[
            ("AAPL", DataType::UsStock),
            ("MSFT", DataType::UsStock),
        ]))
        .build()
        .expect("service builds");

    let summary = service.pre_warm().await;
    assert_eq!(summary.refreshed, 2);
    assert_eq!(summary.defaulted, 2);
    assert!(summary.failure_rate() >= 0.2);

    let emitted = alerts.alerts();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].key, "prewarm:high-failure-rate");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overlapping_passes_are_skipped_not_queued() {
    let store = Arc::new(MemoryTable::new());
    let (slow, ctl) = DynamicMockFetcher::new("slow", DataType::UsStock, 10);
    let warm = quote_fixture("AAPL", DataType::UsStock, "slow");
    ctl.set_behavior(
        "AAPL",
        FetchBehavior::Delay(Duration::from_millis(300), Box::new(warm)),
    )
    .await;

    let service = Kehai::builder()
        .store(Arc::clone(&store) as Arc<dyn KeyValueTable>)
        .with_fetcher(slow as Arc<dyn QuoteFetcher>)
        .config(prewarm_config(&[("AAPL", DataType::UsStock)]))
        .build()
        .expect("service builds");

    let racing = {
        let service = service.clone();
        tokio::spawn(async move { service.pre_warm().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = service.pre_warm().await;
    assert!(second.skipped);

    let first = racing.await.expect("join ok");
    assert!(!first.skipped);
    assert_eq!(first.refreshed, 1);
    assert_eq!(first.defaulted, 0);
}

#[tokio::test]
async fn scheduler_loop_spawns_and_stops_cleanly() {
    let store = Arc::new(MemoryTable::new());
    let yahoo = Arc::new(MockFetcher::new("yahoo", DataType::UsStock));
    let service = Kehai::builder()
        .store(Arc::clone(&store) as Arc<dyn KeyValueTable>)
        .with_fetcher(yahoo as Arc<dyn QuoteFetcher>)
        .config(prewarm_config(&[("AAPL", DataType::UsStock)]))
        .build()
        .expect("service builds");

    let handle = service.spawn_scheduler();
    assert!(!handle.is_finished());
    handle.stop().await;
}
