//! Schema error types
//!
//! Error codes:
//! - ADC_SCHEMA_MALFORMED (FATAL)
//! - ADC_SCHEMA_UNKNOWN_ENTITY (FATAL)

use std::fmt;

/// Severity levels for schema errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Startup cannot continue without a usable schema
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Schema-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorCode {
    /// Schema text is not valid JSON or lacks required structure
    AdcSchemaMalformed,
    /// Requested entity (e.g. `Rearrangement`) is not defined
    AdcSchemaUnknownEntity,
}

impl SchemaErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::AdcSchemaMalformed => "ADC_SCHEMA_MALFORMED",
            SchemaErrorCode::AdcSchemaUnknownEntity => "ADC_SCHEMA_UNKNOWN_ENTITY",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        Severity::Fatal
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Schema error type with context
#[derive(Debug)]
pub struct SchemaError {
    code: SchemaErrorCode,
    message: String,
}

impl SchemaError {
    /// Create an error for a malformed schema document
    pub fn malformed(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: SchemaErrorCode::AdcSchemaMalformed,
            message: format!("Malformed schema '{}': {}", source.into(), reason.into()),
        }
    }

    /// Create an error for an entity missing from the schema document
    pub fn unknown_entity(entity: impl Into<String>) -> Self {
        Self {
            code: SchemaErrorCode::AdcSchemaUnknownEntity,
            message: format!("Schema entity '{}' not found", entity.into()),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> SchemaErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Schema errors always stop startup
    pub fn is_fatal(&self) -> bool {
        true
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code.code(), self.message)
    }
}

impl std::error::Error for SchemaError {}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(SchemaErrorCode::AdcSchemaMalformed.code(), "ADC_SCHEMA_MALFORMED");
        assert_eq!(SchemaErrorCode::AdcSchemaUnknownEntity.code(), "ADC_SCHEMA_UNKNOWN_ENTITY");
    }

    #[test]
    fn test_display_includes_code_and_severity() {
        let err = SchemaError::unknown_entity("Clone");
        let display = err.to_string();
        assert!(display.contains("FATAL"));
        assert!(display.contains("ADC_SCHEMA_UNKNOWN_ENTITY"));
        assert!(display.contains("Clone"));
        assert!(err.is_fatal());
    }
}
