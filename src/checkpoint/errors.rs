//! # Checkpoint Store Errors

use thiserror::Error;

/// Result type for checkpoint store operations
pub type CheckpointStoreResult<T> = Result<T, CheckpointStoreError>;

/// Checkpoint store errors
#[derive(Debug, Clone, Error)]
pub enum CheckpointStoreError {
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    #[error("Checkpoint already exists: {0}")]
    AlreadyExists(String),

    /// Stored record cannot be read back; needs operator intervention
    #[error("Checkpoint {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },

    /// Record under this id tracks a different job
    #[error("Checkpoint {id} belongs to another job: {reason}")]
    Mismatch { id: String, reason: String },

    #[error("Invalid checkpoint id: {0}")]
    InvalidId(String),

    /// Temporary failure; the loader retries these
    #[error("Transient checkpoint store error: {0}")]
    Transient(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl CheckpointStoreError {
    /// Returns true if repeating the write may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckpointStoreError::Transient(_) | CheckpointStoreError::Io(_))
    }
}

impl From<std::io::Error> for CheckpointStoreError {
    fn from(err: std::io::Error) -> Self {
        CheckpointStoreError::Io(err.to_string())
    }
}
