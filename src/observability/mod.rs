//! Observability subsystem for airrdb
//!
//! - Structured logging (JSON lines on stderr)
//! - Typed lifecycle events
//! - Operational alerts through an `AlertSink`
//!
//! # Principles
//!
//! 1. Observability is write-only from the core's point of view
//! 2. Logging failures never fail an operation
//! 3. Deterministic line layout
//!
//! # Usage
//!
//! ```ignore
//! use airrdb::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::LoadSetInserted, &[("load_set", "3")]);
//! ```

mod alert;
mod events;
mod logger;

pub use alert::{AlertSink, LogAlertSink, RecordingAlertSink};
pub use events::Event;
pub use logger::{Logger, Severity};

fn severity_for(event: Event) -> Severity {
    if event.is_fatal() {
        Severity::Fatal
    } else if event.is_failure() {
        Severity::Warn
    } else {
        Severity::Info
    }
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    Logger::log(severity_for(event), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity_for(event), event.as_str(), fields);
}
