//! Degraded-default quote synthesis.
//!
//! When every live source fails (or a symbol is cooling down), the resolver
//! still answers with a marked default so callers never see an error. The
//! synthesizer is total: it accepts any symbol and never fails.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use kehai_types::{DEFAULT_SOURCE, DataType, Quote};

/// Label attached to mutual-fund NAV prices.
const NAV_LABEL: &str = "基準価額";

/// Mutual funds are quoted against a 10,000-yen base NAV.
const FUND_BASE_NAV: i64 = 10_000;

/// Fallback rate for a currency pair.
///
/// Identity for `base == target`; a small table covers the common pairs;
/// unknown pairs fall back to the USD-JPY table value when either side is
/// JPY, else to 1.0.
#[must_use]
pub fn default_rate(base: &str, target: &str) -> Decimal {
    if base == target {
        return Decimal::ONE;
    }
    match (base, target) {
        ("USD", "JPY") => Decimal::new(14_950, 2),
        ("EUR", "JPY") => Decimal::new(16_200, 2),
        ("GBP", "JPY") => Decimal::new(19_000, 2),
        ("AUD", "JPY") => Decimal::new(9_800, 2),
        ("CNY", "JPY") => Decimal::new(2_100, 2),
        ("EUR", "USD") => Decimal::new(108, 2),
        ("GBP", "USD") => Decimal::new(127, 2),
        _ if base == "JPY" || target == "JPY" => default_rate("USD", "JPY"),
        _ => Decimal::ONE,
    }
}

/// Synthesize a marked-default quote for one symbol.
#[must_use]
pub fn default_quote(symbol: &str, data_type: DataType, now: DateTime<Utc>) -> Quote {
    let mut quote = Quote {
        symbol: symbol.to_string(),
        data_type,
        price: Decimal::ZERO,
        change: Decimal::ZERO,
        change_percent: Decimal::ZERO,
        currency: data_type.default_currency().to_string(),
        name: symbol.to_string(),
        last_updated: now,
        source: DEFAULT_SOURCE.to_string(),
        is_default: true,
        price_label: None,
        base: None,
        target: None,
        pair: None,
    };

    match data_type {
        DataType::UsStock | DataType::JpStock => {}
        DataType::MutualFund => {
            quote.price = Decimal::from(FUND_BASE_NAV);
            quote.price_label = Some(NAV_LABEL.to_string());
        }
        DataType::ExchangeRate => {
            // Symbols that are not a BASE-TARGET pair still synthesize, with
            // the whole symbol standing in for both sides.
            let (base, target) = symbol.split_once('-').unwrap_or((symbol, symbol));
            quote.price = default_rate(base, target);
            quote.currency = target.to_string();
            quote.base = Some(base.to_string());
            quote.target = Some(target.to_string());
            quote.pair = Some(format!("{base}-{target}"));
        }
    }

    quote
}
