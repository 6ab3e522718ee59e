use std::time::Duration;

use proptest::prelude::*;

use kehai_core::backoff::BackoffSchedule;
use kehai_types::BackoffConfig;

fn schedule() -> BackoffSchedule {
    BackoffSchedule::new(BackoffConfig {
        min_backoff_ms: 400,
        max_backoff_ms: 5_000,
        factor: 2,
        jitter_percent: 25,
    })
}

#[test]
fn base_delay_doubles_until_the_cap() {
    let s = schedule();
    assert_eq!(s.base_delay(0), Duration::from_millis(400));
    assert_eq!(s.base_delay(1), Duration::from_millis(800));
    assert_eq!(s.base_delay(2), Duration::from_millis(1_600));
    assert_eq!(s.base_delay(3), Duration::from_millis(3_200));
    assert_eq!(s.base_delay(4), Duration::from_millis(5_000));
    assert_eq!(s.base_delay(30), Duration::from_millis(5_000));
}

#[test]
fn jitter_stays_within_its_band() {
    let s = schedule();
    for _ in 0..100 {
        let d = s.delay(1, None).as_millis();
        assert!((800..=1_000).contains(&d), "delay {d}ms out of band");
    }
}

#[test]
fn retry_after_hint_overrides_the_schedule() {
    let s = schedule();
    assert_eq!(s.delay(0, Some(1_234)), Duration::from_millis(1_234));
    // Hints are still capped.
    assert_eq!(s.delay(0, Some(60_000)), Duration::from_millis(5_000));
}

#[test]
fn zero_jitter_is_deterministic() {
    let s = BackoffSchedule::new(BackoffConfig {
        min_backoff_ms: 100,
        max_backoff_ms: 1_000,
        factor: 3,
        jitter_percent: 0,
    });
    assert_eq!(s.delay(0, None), Duration::from_millis(100));
    assert_eq!(s.delay(1, None), Duration::from_millis(300));
    assert_eq!(s.delay(2, None), Duration::from_millis(900));
    assert_eq!(s.delay(3, None), Duration::from_millis(1_000));
}

proptest! {
    #[test]
    fn delays_never_exceed_the_declared_maximum(
        min in 1u64..2_000,
        max in 1u64..10_000,
        factor in 1u32..5,
        jitter in 0u8..=100,
        attempt in 0u32..20,
        hint in proptest::option::of(0u64..100_000),
    ) {
        let (min, max) = (min.min(max), min.max(max));
        let s = BackoffSchedule::new(BackoffConfig {
            min_backoff_ms: min,
            max_backoff_ms: max,
            factor,
            jitter_percent: jitter,
        });
        prop_assert!(s.delay(attempt, hint) <= s.max_delay());
        prop_assert!(s.base_delay(attempt) >= Duration::from_millis(min.min(max)));
    }
}
