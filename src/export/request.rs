//! Export request

use std::fmt;
use std::time::Instant;

use serde_json::Value;

use crate::filter::CompiledPredicate;
use crate::schema::SchemaAdapter;

/// Output encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Tsv,
}

impl ExportFormat {
    /// Parse a format name (`json` or `tsv`, case-insensitive)
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "tsv" => Some(ExportFormat::Tsv),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Tsv => "tsv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything the engine needs to stream one result set
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub collection: String,
    /// `None` matches every document
    pub predicate: Option<CompiledPredicate>,
    /// Top-level fields to emit; `None` emits whole records
    pub projection: Option<Vec<String>>,
    /// Fields backfilled with null when a record lacks them
    pub required_fields: Vec<String>,
    pub from: usize,
    pub size: Option<usize>,
    pub format: ExportFormat,
    /// Key of the record array in the JSON envelope
    pub entity: String,
    /// Value of the JSON envelope's `Info` key
    pub info: Value,
    /// Abort once this instant has passed
    pub deadline: Option<Instant>,
}

impl ExportRequest {
    pub fn new(collection: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            predicate: None,
            projection: None,
            required_fields: Vec::new(),
            from: 0,
            size: None,
            format: ExportFormat::Json,
            entity: entity.into(),
            info: Value::Object(Default::default()),
            deadline: None,
        }
    }

    pub fn predicate(mut self, predicate: CompiledPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn projection(mut self, fields: Vec<String>) -> Self {
        self.projection = Some(fields);
        self
    }

    pub fn required_fields(mut self, fields: Vec<String>) -> Self {
        self.required_fields = fields;
        self
    }

    pub fn from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn info(mut self, info: Value) -> Self {
        self.info = info;
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Add a schema profile's fields (`airr-core`, `airr-schema`, `miairr`)
    /// to the required fields and, when a projection is set, to it as well.
    pub fn include_profile(mut self, schema: &dyn SchemaAdapter, profile: &str) -> Self {
        for field in schema.required_fields(profile) {
            if let Some(projection) = self.projection.as_mut() {
                if !projection.contains(&field) {
                    projection.push(field.clone());
                }
            }
            if !self.required_fields.contains(&field) {
                self.required_fields.push(field);
            }
        }
        self
    }

    /// True if `field` was explicitly projected
    pub fn is_projected(&self, field: &str) -> bool {
        self.projection
            .as_ref()
            .map(|p| p.iter().any(|f| f == field))
            .unwrap_or(false)
    }
}
