use std::sync::Arc;
use std::time::Duration;

use kehai::blacklist::BlacklistRegistry;
use kehai::{Clock, DataType, KeyValueTable};
use kehai_mock::{ManualClock, MemoryTable};
use kehai_types::{BlacklistConfig, KehaiError};

fn registry_over(store: &Arc<MemoryTable>, clock: &Arc<ManualClock>) -> BlacklistRegistry {
    BlacklistRegistry::new(
        Arc::clone(store) as Arc<dyn KeyValueTable>,
        Arc::clone(clock) as Arc<dyn Clock>,
        BlacklistConfig::default(),
    )
}

#[tokio::test]
async fn symbol_goes_cold_at_the_threshold() {
    let store = Arc::new(MemoryTable::new());
    let clock = Arc::new(ManualClock::new());
    let registry = registry_over(&store, &clock);

    for i in 0..4 {
        registry
            .record_failure("JNK", DataType::UsStock, "all sources exhausted")
            .await
            .expect("record ok");
        assert!(
            !registry.is_cold("JNK", DataType::UsStock).await,
            "not cold after {} failures",
            i + 1
        );
    }

    registry
        .record_failure("JNK", DataType::UsStock, "all sources exhausted")
        .await
        .expect("record ok");
    assert!(registry.is_cold("JNK", DataType::UsStock).await);

    let entry = registry
        .entry("JNK", DataType::UsStock)
        .await
        .expect("read ok")
        .expect("present");
    assert_eq!(entry.consecutive_failures, 5);
    assert!(entry.cooldown_until.is_some());
}

#[tokio::test]
async fn cooldown_elapses_with_time() {
    let store = Arc::new(MemoryTable::new());
    let clock = Arc::new(ManualClock::new());
    let registry = registry_over(&store, &clock);

    for _ in 0..5 {
        registry
            .record_failure("JNK", DataType::JpStock, "network")
            .await
            .expect("record ok");
    }
    assert!(registry.is_cold("JNK", DataType::JpStock).await);

    clock.advance(Duration::from_secs(6 * 60 * 60 + 1));
    assert!(!registry.is_cold("JNK", DataType::JpStock).await);
}

#[tokio::test]
async fn one_success_clears_the_cooldown_immediately() {
    let store = Arc::new(MemoryTable::new());
    let clock = Arc::new(ManualClock::new());
    let registry = registry_over(&store, &clock);

    for _ in 0..5 {
        registry
            .record_failure("FLAKY", DataType::MutualFund, "timeout")
            .await
            .expect("record ok");
    }
    assert!(registry.is_cold("FLAKY", DataType::MutualFund).await);

    registry
        .record_success("FLAKY", DataType::MutualFund)
        .await
        .expect("clear ok");
    assert!(!registry.is_cold("FLAKY", DataType::MutualFund).await);
    assert!(
        registry
            .entry("FLAKY", DataType::MutualFund)
            .await
            .expect("read ok")
            .is_none()
    );
}

#[tokio::test]
async fn a_lapsed_cooldown_rearms_on_the_next_failure() {
    let store = Arc::new(MemoryTable::new());
    let clock = Arc::new(ManualClock::new());
    let registry = registry_over(&store, &clock);

    for _ in 0..5 {
        registry
            .record_failure("JNK", DataType::UsStock, "network")
            .await
            .expect("record ok");
    }
    assert!(registry.is_cold("JNK", DataType::UsStock).await);

    // The cooldown lapses but the entry is not swept yet.
    clock.advance(Duration::from_secs(6 * 60 * 60 + 1));
    assert!(!registry.is_cold("JNK", DataType::UsStock).await);

    // The streak is still past the threshold, so one more all-source
    // failure re-cools the symbol for a fresh window.
    registry
        .record_failure("JNK", DataType::UsStock, "network")
        .await
        .expect("record ok");
    assert!(registry.is_cold("JNK", DataType::UsStock).await);

    let entry = registry
        .entry("JNK", DataType::UsStock)
        .await
        .expect("read ok")
        .expect("present");
    assert_eq!(entry.consecutive_failures, 6);
    let until = entry.cooldown_until.expect("re-armed");
    assert_eq!(
        (until - clock.now()).to_std().expect("positive"),
        Duration::from_secs(6 * 60 * 60)
    );
}

#[tokio::test]
async fn the_warm_gate_reports_the_remaining_cooldown() {
    let store = Arc::new(MemoryTable::new());
    let clock = Arc::new(ManualClock::new());
    let registry = registry_over(&store, &clock);

    registry
        .ensure_warm("OK", DataType::UsStock)
        .await
        .expect("warm symbol passes");

    for _ in 0..5 {
        registry
            .record_failure("JNK", DataType::UsStock, "network")
            .await
            .expect("record ok");
    }
    let err = registry
        .ensure_warm("JNK", DataType::UsStock)
        .await
        .expect_err("cold symbol gated");
    match err {
        KehaiError::Blacklisted { symbol, reset_in_ms } => {
            assert_eq!(symbol, "JNK");
            assert_eq!(reset_in_ms, 6 * 60 * 60 * 1000);
        }
        other => panic!("expected Blacklisted, got {other:?}"),
    }
}

#[tokio::test]
async fn exchange_rates_use_their_own_threshold() {
    let store = Arc::new(MemoryTable::new());
    let clock = Arc::new(ManualClock::new());
    let registry = registry_over(&store, &clock);

    for _ in 0..9 {
        registry
            .record_failure("USD-JPY", DataType::ExchangeRate, "network")
            .await
            .expect("record ok");
    }
    assert!(!registry.is_cold("USD-JPY", DataType::ExchangeRate).await);

    registry
        .record_failure("USD-JPY", DataType::ExchangeRate, "network")
        .await
        .expect("record ok");
    assert!(registry.is_cold("USD-JPY", DataType::ExchangeRate).await);
}

#[tokio::test]
async fn sweep_removes_elapsed_cooldowns_only() {
    let store = Arc::new(MemoryTable::new());
    let clock = Arc::new(ManualClock::new());
    let registry = registry_over(&store, &clock);

    for _ in 0..5 {
        registry
            .record_failure("COLD", DataType::UsStock, "network")
            .await
            .expect("record ok");
    }
    registry
        .record_failure("WARM", DataType::UsStock, "network")
        .await
        .expect("record ok");

    clock.advance(Duration::from_secs(6 * 60 * 60 + 1));
    let removed = registry.sweep().await.expect("sweep ok");
    assert_eq!(removed, 1);
    assert!(
        registry
            .entry("COLD", DataType::UsStock)
            .await
            .expect("read ok")
            .is_none()
    );
    // The counting-but-not-cold entry stays until a success clears it.
    assert!(
        registry
            .entry("WARM", DataType::UsStock)
            .await
            .expect("read ok")
            .is_some()
    );
}

#[tokio::test]
async fn store_failures_read_as_not_cold() {
    let store = Arc::new(MemoryTable::new());
    let clock = Arc::new(ManualClock::new());
    let registry = registry_over(&store, &clock);

    for _ in 0..5 {
        registry
            .record_failure("JNK", DataType::UsStock, "network")
            .await
            .expect("record ok");
    }
    store.fail_reads(true);
    assert!(!registry.is_cold("JNK", DataType::UsStock).await);
}
