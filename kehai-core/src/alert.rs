use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Severity attached to an emitted alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    /// Informational summary events.
    Info,
    /// Degradation worth operator attention.
    Warning,
    /// Validation or availability failures requiring action.
    High,
}

/// One alert event handed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Dedup key, e.g. `"US_STOCK:high-failure-rate"`.
    pub key: String,
    /// Severity of the event.
    pub severity: AlertSeverity,
    /// Short subject line.
    pub subject: String,
    /// Free-form detail.
    pub message: String,
}

impl Alert {
    /// Build an alert.
    pub fn new(
        key: impl Into<String>,
        severity: AlertSeverity,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            severity,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

/// Best-effort alert delivery.
///
/// The orchestrator never awaits delivery outcomes beyond the call itself and
/// never fails a request because an alert could not be sent.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one alert.
    async fn emit(&self, alert: Alert);
}

/// Sink that drops every alert; the default when none is injected.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAlertSink;

#[async_trait]
impl AlertSink for NullAlertSink {
    async fn emit(&self, alert: Alert) {
        tracing::debug!(
            target = "kehai::alert",
            event = "dropped",
            key = %alert.key,
            "no alert sink configured"
        );
    }
}
