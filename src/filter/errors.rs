//! Filter compiler error types
//!
//! Error codes:
//! - ADC_MALFORMED_FILTER (REJECT)
//! - ADC_UNSUPPORTED_FIELD (REJECT)
//! - ADC_TYPE_MISMATCH (REJECT)
//! - ADC_OPERATOR_DISABLED (REJECT)
//! - ADC_VALUE_TOO_SHORT (REJECT)
//!
//! Compiler errors are deterministic. They go straight back to the caller
//! and are never retried.

use std::fmt;

/// Severity levels for filter errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Client request rejected
    Reject,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
        }
    }
}

/// Filter-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterErrorCode {
    /// Node lacks `op`/`content`, or has an unknown operator
    AdcMalformedFilter,
    /// Field is not marked query-supported by the schema
    AdcUnsupportedField,
    /// Value does not match the field's declared type
    AdcTypeMismatch,
    /// Operator is switched off by configuration
    AdcOperatorDisabled,
    /// Value is below the operator's minimum length
    AdcValueTooShort,
}

impl FilterErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            FilterErrorCode::AdcMalformedFilter => "ADC_MALFORMED_FILTER",
            FilterErrorCode::AdcUnsupportedField => "ADC_UNSUPPORTED_FIELD",
            FilterErrorCode::AdcTypeMismatch => "ADC_TYPE_MISMATCH",
            FilterErrorCode::AdcOperatorDisabled => "ADC_OPERATOR_DISABLED",
            FilterErrorCode::AdcValueTooShort => "ADC_VALUE_TOO_SHORT",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        Severity::Reject
    }
}

impl fmt::Display for FilterErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Filter error type with full context
#[derive(Debug, Clone, PartialEq)]
pub struct FilterError {
    code: FilterErrorCode,
    message: String,
    field: Option<String>,
}

impl FilterError {
    /// Create a malformed filter error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self {
            code: FilterErrorCode::AdcMalformedFilter,
            message: reason.into(),
            field: None,
        }
    }

    /// Create an unsupported field error
    pub fn unsupported_field(field: impl Into<String>) -> Self {
        let f = field.into();
        Self {
            code: FilterErrorCode::AdcUnsupportedField,
            message: format!("Field '{}' is not supported for queries", f),
            field: Some(f),
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(field: impl Into<String>, expected: &str, actual: &str) -> Self {
        let f = field.into();
        Self {
            code: FilterErrorCode::AdcTypeMismatch,
            message: format!(
                "Field '{}' has type '{}' but value has type '{}'",
                f, expected, actual
            ),
            field: Some(f),
        }
    }

    /// Create a type mismatch error for a type that scalars cannot be compared with
    pub fn unsupported_type(field: impl Into<String>, type_name: &str) -> Self {
        let f = field.into();
        Self {
            code: FilterErrorCode::AdcTypeMismatch,
            message: format!("Field '{}' has unsupported content type '{}'", f, type_name),
            field: Some(f),
        }
    }

    /// Create an operator disabled error
    pub fn operator_disabled(op: &str, field: impl Into<String>) -> Self {
        let f = field.into();
        Self {
            code: FilterErrorCode::AdcOperatorDisabled,
            message: format!("Operator '{}' is disabled (field '{}')", op, f),
            field: Some(f),
        }
    }

    /// Create a value too short error
    pub fn value_too_short(field: impl Into<String>, minimum: usize) -> Self {
        let f = field.into();
        Self {
            code: FilterErrorCode::AdcValueTooShort,
            message: format!("Value for field '{}' must be at least {} characters", f, minimum),
            field: Some(f),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> FilterErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the offending field, if any
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Filter errors never stop the process
    pub fn is_fatal(&self) -> bool {
        false
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code.code(), self.message)
    }
}

impl std::error::Error for FilterError {}

/// Result type for filter compilation
pub type FilterResult<T> = Result<T, FilterError>;
