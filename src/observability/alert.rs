//! Operational alerts
//!
//! Loader failures are escalated to an operator in addition to being
//! returned to the caller. Delivery (chat webhooks, paging) lives outside
//! this crate; the core only sees the `AlertSink` seam.

use std::sync::Mutex;

use super::events::Event;
use super::logger::Logger;

/// Destination for operational alerts
pub trait AlertSink: Send + Sync {
    /// Raise an alert. Must not fail the caller.
    fn alert(&self, context: &str, message: &str);
}

/// Alert sink that writes an `OPERATIONAL_ALERT` log line
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn alert(&self, context: &str, message: &str) {
        Logger::error(
            Event::OperationalAlert.as_str(),
            &[("context", context), ("message", message)],
        );
    }
}

/// Alert sink that keeps alerts in memory, for inspection in tests and tools
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<(String, String)>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All alerts raised so far, oldest first
    pub fn alerts(&self) -> Vec<(String, String)> {
        match self.alerts.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AlertSink for RecordingAlertSink {
    fn alert(&self, context: &str, message: &str) {
        let mut guard = match self.alerts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push((context.to_string(), message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingAlertSink::new();
        sink.alert("loader", "first");
        sink.alert("loader", "second");

        let alerts = sink.alerts();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].1, "first");
        assert_eq!(alerts[1].1, "second");
    }

    #[test]
    fn test_log_sink_does_not_panic() {
        LogAlertSink.alert("loader", "checkpoint write failed");
    }
}
