use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of an upstream fetch failure.
///
/// Kinds drive both the retry decision (only transient kinds are retried) and
/// the per-source error counters that feed priority reordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The upstream did not answer within the fetcher's deadline.
    Timeout,
    /// HTTP 429 or an explicit rate-limit signal from the upstream.
    RateLimit,
    /// Connection-level failures: resets, DNS, unreachable hosts, HTTP 5xx.
    Network,
    /// The symbol is unknown to this upstream (HTTP 404).
    NotFound,
    /// The upstream answered but the payload failed parsing or shape checks.
    Validation,
    /// Anything that does not match a more specific kind.
    Other,
}

impl ErrorKind {
    /// Every kind, in counter-display order.
    pub const ALL: [Self; 6] = [
        Self::Timeout,
        Self::RateLimit,
        Self::Network,
        Self::NotFound,
        Self::Validation,
        Self::Other,
    ];

    /// Derive a kind from an optional HTTP status and an error message.
    ///
    /// Status codes win over message substrings; 5xx classifies as `Network`
    /// so that retryability stays kind-driven.
    #[must_use]
    pub fn classify(status: Option<u16>, msg: &str) -> Self {
        match status {
            Some(429) => return Self::RateLimit,
            Some(404) => return Self::NotFound,
            Some(s) if (500..600).contains(&s) => return Self::Network,
            _ => {}
        }
        let lower = msg.to_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else if lower.contains("rate limit") || lower.contains("too many requests") {
            Self::RateLimit
        } else if lower.contains("econnreset") || lower.contains("network") || lower.contains("dns")
        {
            Self::Network
        } else if lower.contains("not found") {
            Self::NotFound
        } else if lower.contains("parse") || lower.contains("unexpected shape") {
            Self::Validation
        } else {
            Self::Other
        }
    }

    /// Whether failures of this kind are worth retrying against the same source.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimit | Self::Network)
    }

    /// Stable snake_case tag used in counters and log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Network => "network",
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the kehai workspace.
///
/// Public quote lookups never surface these to callers (degraded output is a
/// marked default quote); the variants exist for the internal recover-or-
/// escalate decisions between the cache tier, resolver, and dispatcher.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum KehaiError {
    /// The underlying key-value store failed. Readers treat this as a miss.
    #[error("store error: {0}")]
    Store(String),

    /// An individual upstream source failed for one symbol.
    #[error("{source_id} failed ({kind}): {msg}")]
    Source {
        /// Stable id of the source that failed.
        source_id: String,
        /// Classified failure kind.
        kind: ErrorKind,
        /// Human-readable error message.
        msg: String,
        /// Upstream-provided retry hint (honored for rate limits), if any.
        retry_after_ms: Option<u64>,
    },

    /// Invalid input argument.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// Configuration was rejected at build time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A resource or symbol could not be found.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing resource, e.g. "quote for AAPL".
        what: String,
    },

    /// Every candidate source was exhausted for a symbol.
    #[error("all sources failed for {symbol}: {attempts:?}")]
    AllSourcesFailed {
        /// The symbol whose resolution failed.
        symbol: String,
        /// Per-source terminal errors, in attempt order.
        attempts: Vec<KehaiError>,
    },

    /// The symbol is cooling down after repeated failures; no upstream work
    /// was attempted.
    #[error("blacklisted: {symbol} cools down for {reset_in_ms}ms")]
    Blacklisted {
        /// The cold symbol.
        symbol: String,
        /// Milliseconds until the cooldown elapses.
        reset_in_ms: u64,
    },

    /// The caller's cancel signal or deadline fired before resolution.
    #[error("cancelled")]
    Cancelled,

    /// Unknown/opaque error.
    #[error("unknown error: {0}")]
    Other(String),
}

impl KehaiError {
    /// Helper: build a `Store` error from any displayable cause.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Helper: build a `Source` error without a retry hint.
    pub fn source_failure(
        source_id: impl Into<String>,
        kind: ErrorKind,
        msg: impl Into<String>,
    ) -> Self {
        Self::Source {
            source_id: source_id.into(),
            kind,
            msg: msg.into(),
            retry_after_ms: None,
        }
    }

    /// Helper: build a `NotFound` error for a description of the missing resource.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// The classified kind of this error, when it carries one.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Source { kind, .. } => Some(*kind),
            Self::NotFound { .. } => Some(ErrorKind::NotFound),
            _ => None,
        }
    }

    /// Whether a retry against the same source could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind().is_some_and(ErrorKind::is_transient)
    }
}
