use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;

use kehai::DataType;
use kehai::fallback::{default_quote, default_rate};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap()
}

#[test]
fn defaults_are_marked_and_timestamped() {
    let q = default_quote("AAPL", DataType::UsStock, now());
    assert!(q.is_default);
    assert_eq!(q.source, "Default");
    assert_eq!(q.symbol, "AAPL");
    assert_eq!(q.last_updated, now());
    assert_eq!(q.currency, "USD");
    assert!(q.price >= Decimal::ZERO);
}

#[test]
fn fund_defaults_carry_the_nav_base_and_label() {
    let q = default_quote("0131103C", DataType::MutualFund, now());
    assert_eq!(q.price, Decimal::from(10_000));
    assert_eq!(q.currency, "JPY");
    assert_eq!(q.price_label.as_deref(), Some("基準価額"));
}

#[test]
fn known_pairs_use_the_table() {
    let q = default_quote("USD-JPY", DataType::ExchangeRate, now());
    assert_eq!(q.price, Decimal::new(14_950, 2));
    assert_eq!(q.base.as_deref(), Some("USD"));
    assert_eq!(q.target.as_deref(), Some("JPY"));
    assert_eq!(q.pair.as_deref(), Some("USD-JPY"));
    assert_eq!(q.currency, "JPY");
}

#[test]
fn identity_pairs_rate_one() {
    assert_eq!(default_rate("USD", "USD"), Decimal::ONE);
    assert_eq!(default_rate("JPY", "JPY"), Decimal::ONE);
}

#[test]
fn unknown_yen_pairs_borrow_the_usd_jpy_rate() {
    assert_eq!(default_rate("CHF", "JPY"), default_rate("USD", "JPY"));
    assert_eq!(default_rate("JPY", "KRW"), default_rate("USD", "JPY"));
}

#[test]
fn unknown_non_yen_pairs_default_to_one() {
    assert_eq!(default_rate("CHF", "NOK"), Decimal::ONE);
}

#[test]
fn rates_are_always_positive() {
    for (base, target) in [
        ("USD", "JPY"),
        ("EUR", "JPY"),
        ("GBP", "JPY"),
        ("AUD", "JPY"),
        ("EUR", "USD"),
        ("ZZZ", "ZZZ"),
        ("ZZZ", "JPY"),
        ("AAA", "BBB"),
    ] {
        assert!(default_rate(base, target) > Decimal::ZERO, "{base}-{target}");
    }
}

#[test]
fn malformed_pair_symbols_still_synthesize() {
    let q = default_quote("YEN", DataType::ExchangeRate, now());
    assert!(q.is_default);
    assert!(q.price > Decimal::ZERO);
    assert_eq!(q.pair.as_deref(), Some("YEN-YEN"));
}
