//! CLI-specific error types
//!
//! Every subsystem error is mapped to one CLI code. The message keeps the
//! subsystem's own rendering (including its `ADC_*` code).

use std::fmt;
use std::io;

use crate::checkpoint::CheckpointStoreError;
use crate::config::ConfigError;
use crate::export::ExportError;
use crate::filter::FilterError;
use crate::ingest::LoaderError;
use crate::schema::SchemaError;
use crate::store::StoreError;

/// CLI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration or schema file error
    ConfigError,
    /// I/O error (stdin/stdout, files)
    IoError,
    /// Request body or arguments unusable
    InvalidRequest,
    /// Filter rejected by the compiler
    QueryRejected,
    /// Document or checkpoint store failure
    StoreError,
    /// Load job failed or was cancelled
    LoadFailed,
    /// Export aborted
    ExportFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "AIRRDB_CLI_CONFIG_ERROR",
            Self::IoError => "AIRRDB_CLI_IO_ERROR",
            Self::InvalidRequest => "AIRRDB_CLI_INVALID_REQUEST",
            Self::QueryRejected => "AIRRDB_CLI_QUERY_REJECTED",
            Self::StoreError => "AIRRDB_CLI_STORE_ERROR",
            Self::LoadFailed => "AIRRDB_CLI_LOAD_FAILED",
            Self::ExportFailed => "AIRRDB_CLI_EXPORT_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
    /// Raised after data was already streamed to stdout
    after_output: bool,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            after_output: false,
        }
    }

    /// Mark the error as raised after stdout carried data
    pub fn after_output(mut self) -> Self {
        self.after_output = true;
        self
    }

    /// True if stdout already carries (partial) command output
    pub fn is_after_output(&self) -> bool {
        self.after_output
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidRequest, msg)
    }

    /// Get the error code
    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::invalid_request(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<SchemaError> for CliError {
    fn from(e: SchemaError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<FilterError> for CliError {
    fn from(e: FilterError) -> Self {
        Self::new(CliErrorCode::QueryRejected, e.to_string())
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        Self::new(CliErrorCode::StoreError, e.to_string())
    }
}

impl From<CheckpointStoreError> for CliError {
    fn from(e: CheckpointStoreError) -> Self {
        Self::new(CliErrorCode::StoreError, e.to_string())
    }
}

impl From<LoaderError> for CliError {
    fn from(e: LoaderError) -> Self {
        Self::new(CliErrorCode::LoadFailed, e.to_string())
    }
}

impl From<ExportError> for CliError {
    fn from(e: ExportError) -> Self {
        Self::new(CliErrorCode::ExportFailed, e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_error_keeps_adc_code() {
        let err: CliError = FilterError::value_too_short("junction_aa", 4).into();
        assert_eq!(err.code(), CliErrorCode::QueryRejected);
        assert!(err.message().contains("ADC_VALUE_TOO_SHORT"));
        assert!(err.to_string().starts_with("AIRRDB_CLI_QUERY_REJECTED"));
    }
}
