use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::DataType;

/// `source` tag for quotes answered from the cache tier.
pub const CACHE_SOURCE: &str = "Cache";

/// `source` tag for synthesized degraded-default quotes.
pub const DEFAULT_SOURCE: &str = "Default";

/// The normalized per-symbol record produced by the aggregation core.
///
/// Wire contract: camelCase field names, `lastUpdated` as an ISO-8601 UTC
/// string with millisecond precision, decimals as JSON numbers. The same
/// shape is stored verbatim as the cache payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Requested symbol, echoed back unchanged.
    pub symbol: String,
    /// Instrument classification.
    pub data_type: DataType,
    /// Latest price (or exchange rate). Never negative.
    pub price: Decimal,
    /// Absolute change versus the previous close.
    pub change: Decimal,
    /// Relative change versus the previous close, in percent.
    pub change_percent: Decimal,
    /// ISO currency code of `price`.
    pub currency: String,
    /// Display name of the instrument (falls back to the symbol).
    pub name: String,
    /// When this record was produced, UTC.
    #[serde(with = "iso_millis")]
    pub last_updated: DateTime<Utc>,
    /// Tag of the producer: a source id, [`CACHE_SOURCE`], or [`DEFAULT_SOURCE`].
    pub source: String,
    /// True when the record was synthesized because no live source answered.
    pub is_default: bool,
    /// Price label for fund NAVs (e.g. "基準価額").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_label: Option<String>,
    /// Base currency for exchange-rate records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Target currency for exchange-rate records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// `"<base>-<target>"` for exchange-rate records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair: Option<String>,
}

impl Quote {
    /// Copy of this quote tagged as a cache hit.
    ///
    /// The stored payload keeps its original producer tag; only the returned
    /// copy flips `source`.
    #[must_use]
    pub fn as_cache_hit(&self) -> Self {
        let mut q = self.clone();
        q.source = CACHE_SOURCE.to_string();
        q
    }
}

/// Serde adapter serializing `DateTime<Utc>` as ISO-8601 with millisecond
/// precision (`2026-01-02T03:04:05.678Z`).
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    /// Serialize with exactly three fractional digits and a `Z` suffix.
    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Deserialize from any RFC 3339 timestamp, normalizing to UTC.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(de::Error::custom)
    }
}
