//! Schema adapter seam
//!
//! The filter compiler, the loader and the exporter only see the schema
//! through this trait.

use serde_json::Value;

use super::types::FieldSpec;

/// Field-set profile: the schema's `required` list
pub const PROFILE_AIRR_CORE: &str = "airr-core";
/// Field-set profile: every field the schema declares
pub const PROFILE_AIRR_SCHEMA: &str = "airr-schema";
/// Field-set profile: fields carrying a MiAIRR annotation
pub const PROFILE_MIAIRR: &str = "miairr";

/// Read-only view of a typed AIRR schema
pub trait SchemaAdapter: Send + Sync {
    /// Returns the spec for a field, or `None` for custom fields
    fn spec_for_field(&self, name: &str) -> Option<FieldSpec>;

    /// Fields belonging to a profile, in schema order. Unknown profiles are empty.
    fn required_fields(&self, profile: &str) -> Vec<String>;

    /// Document skeleton holding the default value of every profile field
    fn template(&self, profile: &str) -> Value;

    /// All schema fields in declaration order
    fn field_order(&self) -> Vec<String>;
}
