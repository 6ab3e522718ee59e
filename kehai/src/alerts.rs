//! Alert dedup / throttling in front of the injected sink.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use kehai_core::alert::{Alert, AlertSink};
use kehai_core::clock::Clock;

/// Suppresses repeats of the same alert key within a time window.
pub struct AlertThrottle {
    sink: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    window: Duration,
    last_emit: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl AlertThrottle {
    /// Build the throttle in front of a sink.
    #[must_use]
    pub fn new(sink: Arc<dyn AlertSink>, clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            sink,
            clock,
            window,
            last_emit: Mutex::new(HashMap::new()),
        }
    }

    /// Forward the alert unless its key fired within the window.
    ///
    /// Returns `true` when the alert was forwarded.
    pub async fn emit(&self, alert: Alert) -> bool {
        let now = self.clock.now();
        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::MAX);
        {
            let mut last_emit = self.last_emit.lock().expect("mutex poisoned");
            if let Some(last) = last_emit.get(&alert.key)
                && now - *last < window
            {
                debug!(
                    target = "kehai::alerts",
                    event = "suppressed",
                    key = %alert.key,
                    "repeat alert within dedup window"
                );
                return false;
            }
            last_emit.retain(|_, at| now - *at < window);
            last_emit.insert(alert.key.clone(), now);
        }
        self.sink.emit(alert).await;
        true
    }
}
