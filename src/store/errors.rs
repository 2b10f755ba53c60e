//! # Document Store Errors

use thiserror::Error;

/// Result type for document store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Document store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Temporary failure; the only kind worth retrying
    #[error("Transient store error: {0}")]
    Transient(String),

    #[error("Corrupt record in '{collection}' at line {line}: {reason}")]
    Corrupt {
        collection: String,
        line: usize,
        reason: String,
    },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// The caller's deadline passed while the cursor was scanning
    #[error("Query deadline exceeded")]
    DeadlineExceeded,
}

impl StoreError {
    /// Returns true if the operation may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvalidDocument(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(StoreError::Transient("timeout".into()).is_retryable());
        assert!(!StoreError::Io("disk".into()).is_retryable());
        assert!(!StoreError::Corrupt {
            collection: "rearrangement".into(),
            line: 3,
            reason: "checksum".into()
        }
        .is_retryable());
        assert!(!StoreError::DeadlineExceeded.is_retryable());
    }
}
