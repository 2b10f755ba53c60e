//! Observable events
//!
//! Every lifecycle step of compilation, loading and export is an explicit,
//! typed event. Events are rendered as the `event` key of a log line.

use std::fmt;

/// Observable events in airrdb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration loaded
    ConfigLoaded,
    /// Schema loaded
    SchemaLoaded,

    // Query operations
    /// Filter compiled into a predicate
    QueryCompiled,
    /// Filter rejected by the compiler
    QueryRejected,
    /// Filter references a field absent from the schema
    QueryCustomField,
    /// Facet aggregation complete
    FacetsComplete,
    /// Count aggregation complete
    CountComplete,

    // Load operations
    /// Load job begins
    LoadStart,
    /// Checkpoint already marks the job loaded
    LoadAlreadyComplete,
    /// Batches from the checkpoint onward were rolled back
    LoadRollback,
    /// Source file opened
    LoadFileStart,
    /// Source file fully consumed
    LoadFileComplete,
    /// Load set inserted and checkpointed
    LoadSetInserted,
    /// Load set skipped (already committed before restart)
    LoadSetSkipped,
    /// Checkpoint update failed once and is retried
    CheckpointUpdateRetry,
    /// Load job complete, checkpoint marked loaded
    LoadComplete,
    /// Load job cancelled between batches
    LoadCancelled,
    /// Load job failed (FATAL for the job)
    LoadFailed,
    /// Repertoire records removed
    UnloadComplete,
    /// Repertoire metadata document replaced
    RepertoireLoaded,
    /// Repertoire metadata batch stored
    RepertoireMetadataComplete,

    // Export operations
    /// Export stream opened
    ExportStart,
    /// Export stream finished
    ExportComplete,
    /// Export stream aborted, sink left incomplete
    ExportAborted,

    // Alerts
    /// Operational alert raised
    OperationalAlert,
}

impl Event {
    /// Returns the event name
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::SchemaLoaded => "SCHEMA_LOADED",
            Event::QueryCompiled => "QUERY_COMPILED",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::QueryCustomField => "QUERY_CUSTOM_FIELD",
            Event::FacetsComplete => "FACETS_COMPLETE",
            Event::CountComplete => "COUNT_COMPLETE",
            Event::LoadStart => "LOAD_START",
            Event::LoadAlreadyComplete => "LOAD_ALREADY_COMPLETE",
            Event::LoadRollback => "LOAD_ROLLBACK",
            Event::LoadFileStart => "LOAD_FILE_START",
            Event::LoadFileComplete => "LOAD_FILE_COMPLETE",
            Event::LoadSetInserted => "LOAD_SET_INSERTED",
            Event::LoadSetSkipped => "LOAD_SET_SKIPPED",
            Event::CheckpointUpdateRetry => "CHECKPOINT_UPDATE_RETRY",
            Event::LoadComplete => "LOAD_COMPLETE",
            Event::LoadCancelled => "LOAD_CANCELLED",
            Event::LoadFailed => "LOAD_FAILED",
            Event::UnloadComplete => "UNLOAD_COMPLETE",
            Event::RepertoireLoaded => "REPERTOIRE_LOADED",
            Event::RepertoireMetadataComplete => "REPERTOIRE_METADATA_COMPLETE",
            Event::ExportStart => "EXPORT_START",
            Event::ExportComplete => "EXPORT_COMPLETE",
            Event::ExportAborted => "EXPORT_ABORTED",
            Event::OperationalAlert => "OPERATIONAL_ALERT",
        }
    }

    /// Returns true if this event terminates the job it belongs to
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::LoadFailed)
    }

    /// Returns true if this event reports a failure or degraded path
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::QueryRejected
                | Event::CheckpointUpdateRetry
                | Event::LoadCancelled
                | Event::LoadFailed
                | Event::ExportAborted
                | Event::OperationalAlert
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_screaming_snake() {
        for event in [
            Event::LoadStart,
            Event::LoadSetInserted,
            Event::CheckpointUpdateRetry,
            Event::ExportAborted,
        ] {
            let name = event.as_str();
            assert!(name.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_only_load_failed_is_fatal() {
        assert!(Event::LoadFailed.is_fatal());
        assert!(!Event::LoadCancelled.is_fatal());
        assert!(!Event::ExportAborted.is_fatal());
    }
}
