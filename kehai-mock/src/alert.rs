use std::sync::Mutex;

use async_trait::async_trait;

use kehai_core::alert::{Alert, AlertSink};

/// Alert sink that records every emitted alert for assertions.
#[derive(Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts emitted so far, in order.
    #[must_use]
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().expect("mutex poisoned").clone()
    }

    /// Number of alerts emitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alerts.lock().expect("mutex poisoned").len()
    }

    /// Whether no alert has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn emit(&self, alert: Alert) {
        self.alerts.lock().expect("mutex poisoned").push(alert);
    }
}
