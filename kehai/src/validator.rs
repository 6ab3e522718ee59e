//! Reasonableness checks on freshly fetched quotes.
//!
//! The jump gate compares a candidate against the last cached payload for
//! the same key; a HIGH flag makes the resolver treat the source as failed,
//! a MEDIUM flag is accepted and recorded. Median mode picks the middle of
//! several sources and reports excessive divergence.

use rust_decimal::Decimal;

use kehai_types::{DataType, Quote, ValidatorConfig};

/// Severity of a validation flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Suspicious but acceptable; recorded only.
    Medium,
    /// Unacceptable; the producing source is treated as failed.
    High,
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    /// How bad it is.
    pub severity: Severity,
    /// What was observed.
    pub detail: String,
}

/// Outcome of assessing one candidate quote.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    /// No concerns.
    Accept,
    /// Accepted, with a MEDIUM flag worth recording.
    AcceptFlagged(ValidationIssue),
    /// Rejected; move on to the next source.
    Reject(ValidationIssue),
}

/// The quality gate.
pub struct QuoteValidator {
    cfg: ValidatorConfig,
}

impl QuoteValidator {
    /// Build the validator from its configuration.
    #[must_use]
    pub const fn new(cfg: ValidatorConfig) -> Self {
        Self { cfg }
    }

    /// Whether the gate runs at all.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    /// Whether the given data type resolves via median-of-sources.
    #[must_use]
    pub fn median_mode_for(&self, data_type: DataType) -> bool {
        self.cfg.median_mode_for(data_type)
    }

    /// Percentage move of `candidate` against `previous`, absolute.
    fn jump_percent(previous: &Quote, candidate: &Quote) -> Option<Decimal> {
        if previous.price.is_zero() {
            return None;
        }
        let jump =
            (candidate.price - previous.price) / previous.price * Decimal::ONE_HUNDRED;
        Some(jump.abs())
    }

    /// Gate one candidate against the last cached payload, when there is one.
    ///
    /// Synthesized defaults never count as a baseline.
    #[must_use]
    pub fn assess(&self, previous: Option<&Quote>, candidate: &Quote) -> Assessment {
        if !self.cfg.enabled {
            return Assessment::Accept;
        }
        let Some(previous) = previous.filter(|p| !p.is_default) else {
            return Assessment::Accept;
        };
        let Some(jump) = Self::jump_percent(previous, candidate) else {
            return Assessment::Accept;
        };

        let (medium, high) = self.cfg.jump_thresholds_for(candidate.data_type);
        if jump > high {
            Assessment::Reject(ValidationIssue {
                severity: Severity::High,
                detail: format!(
                    "price moved {jump:.2}% against cached {} (limit {high}%)",
                    previous.price
                ),
            })
        } else if jump > medium {
            Assessment::AcceptFlagged(ValidationIssue {
                severity: Severity::Medium,
                detail: format!(
                    "price moved {jump:.2}% against cached {} (watch limit {medium}%)",
                    previous.price
                ),
            })
        } else {
            Assessment::Accept
        }
    }

    /// Pick the median-priced quote out of several source results.
    ///
    /// Returns the winner plus a divergence issue when the max/min spread
    /// exceeds the configured bound for the data type.
    #[must_use]
    pub fn median_pick(&self, mut quotes: Vec<Quote>) -> Option<(Quote, Option<ValidationIssue>)> {
        if quotes.is_empty() {
            return None;
        }
        quotes.sort_by(|a, b| a.price.cmp(&b.price));
        let min = quotes.first().map(|q| q.price).unwrap_or_default();
        let max = quotes.last().map(|q| q.price).unwrap_or_default();
        let winner = quotes.swap_remove(quotes.len() / 2);

        let issue = (!winner.price.is_zero())
            .then(|| (max - min) / winner.price * Decimal::ONE_HUNDRED)
            .filter(|spread| *spread > self.cfg.divergence_for(winner.data_type))
            .map(|spread| ValidationIssue {
                severity: Severity::Medium,
                detail: format!(
                    "sources diverge by {spread:.2}% (min {min}, max {max})"
                ),
            });

        Some((winner, issue))
    }
}
