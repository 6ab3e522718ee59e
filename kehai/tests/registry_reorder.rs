use std::sync::Arc;

use kehai::metrics::{AttemptOutcome, MetricsSink};
use kehai::registry::SourceRegistry;
use kehai::{DataType, ErrorKind, Kehai, KeyValueTable, QuoteFetcher};
use kehai_mock::{DynamicMockFetcher, FetchBehavior, MemoryTable, MockFetcher};
use kehai_types::{KehaiError, ReorderConfig};

fn fetcher(id: &'static str, priority: u32) -> Arc<dyn QuoteFetcher> {
    Arc::new(MockFetcher::new(id, DataType::UsStock).with_priority(priority))
}

#[test]
fn initial_order_follows_default_priorities() {
    let registry = SourceRegistry::new(vec![
        fetcher("scraper", 20),
        fetcher("yahoo", 10),
        fetcher("vendor", 30),
    ]);
    assert_eq!(
        registry.order_for(DataType::UsStock),
        vec!["yahoo", "scraper", "vendor"]
    );
    assert!(registry.order_for(DataType::JpStock).is_empty());
}

#[test]
fn reorder_swaps_one_neighbor_at_a_time() {
    let registry = SourceRegistry::new(vec![
        fetcher("a", 1),
        fetcher("b", 2),
        fetcher("c", 3),
    ]);

    registry.reorder(DataType::UsStock, "c", 1);
    assert_eq!(registry.order_for(DataType::UsStock), vec!["a", "c", "b"]);

    registry.reorder(DataType::UsStock, "a", -1);
    assert_eq!(registry.order_for(DataType::UsStock), vec!["c", "a", "b"]);

    // Edges are no-ops.
    registry.reorder(DataType::UsStock, "c", 1);
    assert_eq!(registry.order_for(DataType::UsStock), vec!["c", "a", "b"]);
    registry.reorder(DataType::UsStock, "b", -1);
    assert_eq!(registry.order_for(DataType::UsStock), vec!["c", "a", "b"]);
    registry.reorder(DataType::UsStock, "nope", 1);
    assert_eq!(registry.order_for(DataType::UsStock), vec!["c", "a", "b"]);
}

#[test]
fn evaluation_demotes_failing_sources_and_drains_the_window() {
    let metrics = MetricsSink::new();
    let cfg = ReorderConfig {
        min_samples: 10,
        ..ReorderConfig::default()
    };

    for _ in 0..10 {
        let h = metrics.begin_attempt("flaky", DataType::UsStock);
        metrics.end_attempt(h, AttemptOutcome::Failure(ErrorKind::Network));
    }

    let decisions = metrics.evaluate(&cfg);
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].source_id, "flaky");
    assert_eq!(decisions[0].delta, -1);

    // The window was drained; nothing new to judge.
    assert!(metrics.evaluate(&cfg).is_empty());
    // Lifetime counters survive evaluation.
    assert_eq!(metrics.counters("flaky", DataType::UsStock).failures, 10);
}

#[test]
fn evaluation_promotes_healthy_sources() {
    let metrics = MetricsSink::new();
    let cfg = ReorderConfig {
        min_samples: 10,
        ..ReorderConfig::default()
    };

    for _ in 0..20 {
        let h = metrics.begin_attempt("solid", DataType::JpStock);
        metrics.end_attempt(h, AttemptOutcome::Success);
    }

    let decisions = metrics.evaluate(&cfg);
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].delta, 1);
}

#[test]
fn sparse_windows_are_not_judged() {
    let metrics = MetricsSink::new();
    let cfg = ReorderConfig {
        min_samples: 10,
        ..ReorderConfig::default()
    };
    for _ in 0..9 {
        let h = metrics.begin_attempt("quiet", DataType::UsStock);
        metrics.end_attempt(h, AttemptOutcome::Failure(ErrorKind::Timeout));
    }
    assert!(metrics.evaluate(&cfg).is_empty());
}

#[tokio::test]
async fn failing_front_source_is_demoted_through_the_service() {
    let store = Arc::new(MemoryTable::new());
    let (flaky, ctl) = DynamicMockFetcher::new("flaky", DataType::UsStock, 10);
    let solid = Arc::new(MockFetcher::new("solid", DataType::UsStock).with_priority(20));

    let mut cfg = kehai_types::KehaiConfig::default();
    cfg.reorder.min_samples = 10;
    // Terminal failures so each resolve costs one attempt, not a retry budget.
    let service = Kehai::builder()
        .store(Arc::clone(&store) as Arc<dyn KeyValueTable>)
        .with_fetcher(Arc::clone(&flaky) as Arc<dyn QuoteFetcher>)
        .with_fetcher(Arc::clone(&solid) as Arc<dyn QuoteFetcher>)
        .config(cfg)
        .build()
        .expect("service builds");

    for i in 0..10 {
        let symbol = format!("SYM{i}");
        ctl.set_behavior(
            &symbol,
            FetchBehavior::Fail(KehaiError::source_failure(
                "flaky",
                ErrorKind::NotFound,
                "symbol not found",
            )),
        )
        .await;
        let quote = service
            .get_quote(DataType::UsStock, &symbol, false)
            .await
            .expect("resolves");
        assert_eq!(quote.source, "solid");
    }

    assert_eq!(service.source_order(DataType::UsStock), vec!["flaky", "solid"]);
    service.evaluate_sources();
    assert_eq!(service.source_order(DataType::UsStock), vec!["solid", "flaky"]);
}
