//! Loader error types
//!
//! Error codes:
//! - ADC_TRANSIENT_STORE_ERROR (ERROR)
//! - ADC_CHECKPOINT_CORRUPT (FATAL)
//! - ADC_SOURCE_STREAM_ERROR (FATAL)
//! - ADC_STORE_FAILED (FATAL)
//! - ADC_LOAD_CANCELLED (ERROR)
//! - ADC_INVALID_RECORD (FATAL)
//!
//! Every loader error leaves the last committed checkpoint valid: the job
//! can be restarted and resumes from it.

use std::fmt;

use crate::checkpoint::CheckpointStoreError;
use crate::store::StoreError;

/// Severity levels for loader errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Job stopped, restart resumes it
    Error,
    /// Job aborted, operator attention required
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Loader error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderErrorCode {
    /// Checkpoint write kept failing after its retries
    AdcTransientStoreError,
    /// Checkpoint record unreadable
    AdcCheckpointCorrupt,
    /// Source file could not be opened, decompressed or parsed
    AdcSourceStreamError,
    /// Document store rejected a read, insert or delete
    AdcStoreFailed,
    /// Job cancelled between batches
    AdcLoadCancelled,
    /// Input document unusable (not an object, no identifier)
    AdcInvalidRecord,
}

impl LoaderErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            LoaderErrorCode::AdcTransientStoreError => "ADC_TRANSIENT_STORE_ERROR",
            LoaderErrorCode::AdcCheckpointCorrupt => "ADC_CHECKPOINT_CORRUPT",
            LoaderErrorCode::AdcSourceStreamError => "ADC_SOURCE_STREAM_ERROR",
            LoaderErrorCode::AdcStoreFailed => "ADC_STORE_FAILED",
            LoaderErrorCode::AdcLoadCancelled => "ADC_LOAD_CANCELLED",
            LoaderErrorCode::AdcInvalidRecord => "ADC_INVALID_RECORD",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            LoaderErrorCode::AdcTransientStoreError | LoaderErrorCode::AdcLoadCancelled => {
                Severity::Error
            }
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for LoaderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Loader error with full context
#[derive(Debug)]
pub struct LoaderError {
    code: LoaderErrorCode,
    message: String,
    escalated: bool,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl LoaderError {
    fn new(
        code: LoaderErrorCode,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            escalated: false,
            source,
        }
    }

    /// Checkpoint update retries exhausted
    pub fn transient(message: impl Into<String>, source: CheckpointStoreError) -> Self {
        Self::new(
            LoaderErrorCode::AdcTransientStoreError,
            message,
            Some(Box::new(source)),
        )
    }

    /// Checkpoint record unreadable or unwritable for a non-transient reason
    pub fn checkpoint(message: impl Into<String>, source: CheckpointStoreError) -> Self {
        Self::new(
            LoaderErrorCode::AdcCheckpointCorrupt,
            message,
            Some(Box::new(source)),
        )
    }

    /// Source stream failure
    pub fn source_stream(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::new(
            LoaderErrorCode::AdcSourceStreamError,
            message,
            Some(Box::new(source)),
        )
    }

    /// Document store failure
    pub fn store(message: impl Into<String>, source: StoreError) -> Self {
        Self::new(LoaderErrorCode::AdcStoreFailed, message, Some(Box::new(source)))
    }

    /// Cancellation observed at a batch boundary
    pub fn cancelled(next_load_set: u64) -> Self {
        Self::new(
            LoaderErrorCode::AdcLoadCancelled,
            format!("Load cancelled before load set {}", next_load_set),
            None,
        )
    }

    /// Rejected input document
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::new(LoaderErrorCode::AdcInvalidRecord, message, None)
    }

    /// Returns the error code
    pub fn code(&self) -> LoaderErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the severity of this error
    pub fn severity(&self) -> Severity {
        if self.escalated {
            Severity::Fatal
        } else {
            self.code.severity()
        }
    }

    /// Returns whether this error aborts the job for good
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Escalate to FATAL once retries are exhausted
    pub fn escalated(mut self) -> Self {
        self.message = format!("{} (retries exhausted)", self.message);
        self.escalated = true;
        self
    }
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for LoaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type for loader operations
pub type LoaderResult<T> = Result<T, LoaderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_codes() {
        assert_eq!(LoaderErrorCode::AdcTransientStoreError.code(), "ADC_TRANSIENT_STORE_ERROR");
        assert_eq!(LoaderErrorCode::AdcCheckpointCorrupt.code(), "ADC_CHECKPOINT_CORRUPT");
        assert_eq!(LoaderErrorCode::AdcSourceStreamError.code(), "ADC_SOURCE_STREAM_ERROR");
        assert_eq!(LoaderErrorCode::AdcStoreFailed.code(), "ADC_STORE_FAILED");
        assert_eq!(LoaderErrorCode::AdcLoadCancelled.code(), "ADC_LOAD_CANCELLED");
        assert_eq!(LoaderErrorCode::AdcInvalidRecord.code(), "ADC_INVALID_RECORD");
    }

    #[test]
    fn test_severity() {
        assert!(!LoaderError::cancelled(3).is_fatal());
        let err = LoaderError::checkpoint("bad", CheckpointStoreError::Corrupt { id: "c".into(), reason: "x".into() });
        assert!(err.is_fatal());
        assert!(err.source().is_some());
    }

    #[test]
    fn test_escalation() {
        let err = LoaderError::transient("update failed", CheckpointStoreError::Transient("503".into()));
        assert!(!err.is_fatal());
        let err = err.escalated();
        assert!(err.is_fatal());
        assert_eq!(err.code(), LoaderErrorCode::AdcTransientStoreError);
        assert!(err.to_string().starts_with("[FATAL] ADC_TRANSIENT_STORE_ERROR"));
        assert!(err.to_string().contains("retries exhausted"));
        assert!(err.to_string().contains("caused by"));
    }
}
