//! Typed AIRR field specifications
//!
//! Field types form a closed set resolved once when the schema is loaded:
//! - integer: 64-bit signed integer
//! - number: 64-bit floating point
//! - boolean
//! - string: UTF-8 string
//! - object: nested document (not directly queryable)
//! - array: sequence with an optional element type

use serde_json::Value;

/// Declared type of an AIRR field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Number,
    Boolean,
    String,
    Object,
    /// Array whose items have the given type, if the schema declares one
    Array { items: Option<Box<FieldType>> },
}

impl FieldType {
    /// Parses a JSON-schema `type` keyword (plus `items` for arrays)
    pub fn from_schema(type_name: &str, items: Option<&Value>) -> Option<Self> {
        let parsed = match type_name {
            "integer" => FieldType::Integer,
            "number" => FieldType::Number,
            "boolean" => FieldType::Boolean,
            "string" => FieldType::String,
            "object" => FieldType::Object,
            "array" => {
                let items = items
                    .and_then(|i| i.get("type"))
                    .and_then(Value::as_str)
                    .and_then(|t| FieldType::from_schema(t, None))
                    .map(Box::new);
                FieldType::Array { items }
            }
            _ => return None,
        };
        Some(parsed)
    }

    /// Returns the type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::String => "string",
            FieldType::Object => "object",
            FieldType::Array { .. } => "array",
        }
    }

    /// Type that scalar query values are checked against.
    ///
    /// A scalar compared with an array-valued field is checked against the
    /// item type; an array without an item type stays `array`.
    pub fn query_type(&self) -> &FieldType {
        match self {
            FieldType::Array { items: Some(items) } => items.as_ref(),
            other => other,
        }
    }

    /// Returns true if the field holds multiple values
    pub fn is_array(&self) -> bool {
        matches!(self, FieldType::Array { .. })
    }

    /// Runtime type name of a JSON value, used for custom (unschematized) fields
    pub fn name_of_value(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Infers a field type from a literal value
    pub fn of_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(_) => Some(FieldType::Boolean),
            Value::Number(_) => Some(FieldType::Number),
            Value::String(_) => Some(FieldType::String),
            Value::Array(_) => Some(FieldType::Array { items: None }),
            Value::Object(_) => Some(FieldType::Object),
            Value::Null => None,
        }
    }
}

/// Specification of a single schema field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name
    pub name: String,
    /// Declared type
    pub field_type: FieldType,
    /// Whether the schema marks the field as supported for ad-hoc queries
    pub queryable: bool,
    /// Whether the field is listed in the schema's `required` set
    pub required: bool,
    /// Whether null is an acceptable value
    pub nullable: bool,
    /// MiAIRR annotation level, if any
    pub miairr: Option<String>,
}

impl FieldSpec {
    /// Create a spec with the given name and type, all annotations unset
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            queryable: false,
            required: false,
            nullable: true,
            miairr: None,
        }
    }

    /// Mark the field as query-supported
    pub fn queryable(mut self) -> Self {
        self.queryable = true;
        self
    }

    /// Mark the field as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}
