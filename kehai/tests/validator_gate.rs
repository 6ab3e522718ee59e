use rust_decimal::Decimal;

use kehai::DataType;
use kehai::validator::{Assessment, QuoteValidator, Severity};
use kehai_mock::quote_fixture;
use kehai_types::ValidatorConfig;

fn priced(symbol: &str, data_type: DataType, price: i64) -> kehai::Quote {
    let mut q = quote_fixture(symbol, data_type, "yahoo");
    q.price = Decimal::from(price);
    q
}

#[test]
fn small_moves_pass() {
    let v = QuoteValidator::new(ValidatorConfig::default());
    let prev = priced("AAPL", DataType::UsStock, 100);
    let next = priced("AAPL", DataType::UsStock, 110);
    assert_eq!(v.assess(Some(&prev), &next), Assessment::Accept);
}

#[test]
fn medium_jumps_flag_but_accept() {
    let v = QuoteValidator::new(ValidatorConfig::default());
    let prev = priced("AAPL", DataType::UsStock, 100);
    let next = priced("AAPL", DataType::UsStock, 130);
    match v.assess(Some(&prev), &next) {
        Assessment::AcceptFlagged(issue) => assert_eq!(issue.severity, Severity::Medium),
        other => panic!("expected a MEDIUM flag, got {other:?}"),
    }
}

#[test]
fn high_jumps_reject() {
    let v = QuoteValidator::new(ValidatorConfig::default());
    let prev = priced("AAPL", DataType::UsStock, 100);
    let next = priced("AAPL", DataType::UsStock, 180);
    match v.assess(Some(&prev), &next) {
        Assessment::Reject(issue) => assert_eq!(issue.severity, Severity::High),
        other => panic!("expected a HIGH rejection, got {other:?}"),
    }
}

#[test]
fn thresholds_tighten_per_data_type() {
    let v = QuoteValidator::new(ValidatorConfig::default());

    // 12% is fine for a stock but MEDIUM for a fund.
    let prev = priced("F1", DataType::MutualFund, 10_000);
    let next = priced("F1", DataType::MutualFund, 11_200);
    assert!(matches!(
        v.assess(Some(&prev), &next),
        Assessment::AcceptFlagged(_)
    ));

    // 6% is MEDIUM for a rate, 12% is HIGH.
    let prev = priced("USD-JPY", DataType::ExchangeRate, 150);
    let next = priced("USD-JPY", DataType::ExchangeRate, 159);
    assert!(matches!(
        v.assess(Some(&prev), &next),
        Assessment::AcceptFlagged(_)
    ));
    let next = priced("USD-JPY", DataType::ExchangeRate, 168);
    assert!(matches!(v.assess(Some(&prev), &next), Assessment::Reject(_)));
}

#[test]
fn missing_or_default_baselines_pass_everything() {
    let v = QuoteValidator::new(ValidatorConfig::default());
    let next = priced("AAPL", DataType::UsStock, 999);
    assert_eq!(v.assess(None, &next), Assessment::Accept);

    let mut default_prev = priced("AAPL", DataType::UsStock, 1);
    default_prev.is_default = true;
    assert_eq!(v.assess(Some(&default_prev), &next), Assessment::Accept);
}

#[test]
fn disabled_validator_accepts_anything() {
    let cfg = ValidatorConfig {
        enabled: false,
        ..ValidatorConfig::default()
    };
    let v = QuoteValidator::new(cfg);
    let prev = priced("AAPL", DataType::UsStock, 100);
    let next = priced("AAPL", DataType::UsStock, 10_000);
    assert_eq!(v.assess(Some(&prev), &next), Assessment::Accept);
}

#[test]
fn median_pick_takes_the_middle_price() {
    let v = QuoteValidator::new(ValidatorConfig::default());
    let quotes = vec![
        priced("AAPL", DataType::UsStock, 101),
        priced("AAPL", DataType::UsStock, 100),
        priced("AAPL", DataType::UsStock, 102),
    ];
    let (winner, issue) = v.median_pick(quotes).expect("non-empty");
    assert_eq!(winner.price, Decimal::from(101));
    assert!(issue.is_none());
}

#[test]
fn median_pick_reports_excessive_divergence() {
    let v = QuoteValidator::new(ValidatorConfig::default());
    let quotes = vec![
        priced("AAPL", DataType::UsStock, 90),
        priced("AAPL", DataType::UsStock, 100),
        priced("AAPL", DataType::UsStock, 120),
    ];
    let (winner, issue) = v.median_pick(quotes).expect("non-empty");
    assert_eq!(winner.price, Decimal::from(100));
    let issue = issue.expect("divergence reported");
    assert_eq!(issue.severity, Severity::Medium);
}

#[test]
fn median_pick_of_nothing_is_none() {
    let v = QuoteValidator::new(ValidatorConfig::default());
    assert!(v.median_pick(Vec::new()).is_none());
}
