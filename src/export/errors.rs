//! # Export Errors

use thiserror::Error;

use crate::store::StoreError;

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;

/// Export errors. Any of these aborts the stream and leaves the sink
/// marked incomplete.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Store error during export: {0}")]
    Store(#[from] StoreError),

    #[error("Sink write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export deadline exceeded after {exported} records")]
    DeadlineExceeded { exported: u64 },

    #[error("Invalid export request: {0}")]
    InvalidRequest(String),

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ExportError {
    /// Returns true if re-running the same export may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ExportError::Store(e) => e.is_retryable(),
            ExportError::DeadlineExceeded { .. } => true,
            _ => false,
        }
    }
}
