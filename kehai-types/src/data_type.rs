use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::KehaiError;

/// Classification of the instruments the aggregation core can serve.
///
/// The variant determines cache TTLs, blacklist thresholds, worker pool
/// sizing, and which upstream sources are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    /// US-listed equities (e.g. `AAPL`).
    UsStock,
    /// Japanese equities, identified by their numeric ticker (e.g. `7203`).
    JpStock,
    /// Japanese mutual funds, identified by their fund association code.
    MutualFund,
    /// Currency exchange rates, identified by a `BASE-TARGET` pair.
    ExchangeRate,
}

impl DataType {
    /// Every data type, in the order used for pre-warm passes.
    pub const ALL: [Self; 4] = [
        Self::UsStock,
        Self::JpStock,
        Self::MutualFund,
        Self::ExchangeRate,
    ];

    /// Wire/storage tag for this data type (also the cache key prefix).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UsStock => "US_STOCK",
            Self::JpStock => "JP_STOCK",
            Self::MutualFund => "MUTUAL_FUND",
            Self::ExchangeRate => "EXCHANGE_RATE",
        }
    }

    /// Default quote currency for instruments of this type.
    #[must_use]
    pub const fn default_currency(self) -> &'static str {
        match self {
            Self::UsStock => "USD",
            Self::JpStock | Self::MutualFund | Self::ExchangeRate => "JPY",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = KehaiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "US_STOCK" => Ok(Self::UsStock),
            "JP_STOCK" => Ok(Self::JpStock),
            "MUTUAL_FUND" => Ok(Self::MutualFund),
            "EXCHANGE_RATE" => Ok(Self::ExchangeRate),
            other => Err(KehaiError::InvalidArg(format!(
                "unknown data type: {other}"
            ))),
        }
    }
}
