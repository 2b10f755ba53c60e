//! JSON-backed AIRR schema
//!
//! Parses an OpenAPI-style entity definition:
//!
//! ```json
//! {"Rearrangement": {"required": ["sequence_id"],
//!   "properties": {"sequence_id": {"type": "string",
//!     "x-airr": {"adc-query-support": true, "nullable": true}}}}}
//! ```
//!
//! Property order is preserved and becomes the TSV column order.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use super::adapter::{SchemaAdapter, PROFILE_AIRR_CORE, PROFILE_AIRR_SCHEMA, PROFILE_MIAIRR};
use super::errors::{SchemaError, SchemaResult};
use super::types::{FieldSpec, FieldType};

/// Name of the rearrangement entity in AIRR schema documents
pub const REARRANGEMENT_ENTITY: &str = "Rearrangement";
/// Entity name of repertoire metadata documents
pub const REPERTOIRE_ENTITY: &str = "Repertoire";

const BUILTIN_REARRANGEMENT: &str = include_str!("rearrangement.json");

/// Typed schema for one AIRR entity
#[derive(Debug, Clone)]
pub struct AirrSchema {
    entity: String,
    order: Vec<String>,
    fields: HashMap<String, FieldSpec>,
}

impl AirrSchema {
    /// The bundled Rearrangement schema
    pub fn builtin_rearrangement() -> SchemaResult<Self> {
        Self::from_json_str(REARRANGEMENT_ENTITY, BUILTIN_REARRANGEMENT)
    }

    /// Load an entity definition from a schema file
    pub fn load(path: &Path, entity: &str) -> SchemaResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SchemaError::malformed(path.display().to_string(), format!("Failed to read file: {}", e))
        })?;
        Self::from_json_str(entity, &content)
    }

    /// Parse an entity definition from schema JSON text
    pub fn from_json_str(entity: &str, text: &str) -> SchemaResult<Self> {
        let document: Value = serde_json::from_str(text)
            .map_err(|e| SchemaError::malformed(entity, format!("Invalid JSON: {}", e)))?;

        let definition = document
            .get(entity)
            .ok_or_else(|| SchemaError::unknown_entity(entity))?;

        let properties = definition
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| SchemaError::malformed(entity, "missing 'properties' object"))?;

        let required: Vec<&str> = match definition.get("required") {
            None => Vec::new(),
            Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).collect(),
            Some(_) => return Err(SchemaError::malformed(entity, "'required' must be an array")),
        };

        let mut order = Vec::with_capacity(properties.len());
        let mut fields = HashMap::with_capacity(properties.len());
        for (name, property) in properties {
            let spec = parse_property(entity, name, property, required.contains(&name.as_str()))?;
            order.push(name.clone());
            fields.insert(name.clone(), spec);
        }

        Ok(Self {
            entity: entity.to_string(),
            order,
            fields,
        })
    }

    /// Entity name this schema describes
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if no fields are declared
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn parse_property(entity: &str, name: &str, property: &Value, required: bool) -> SchemaResult<FieldSpec> {
    let type_name = property
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaError::malformed(entity, format!("field '{}' has no type", name)))?;

    let field_type = FieldType::from_schema(type_name, property.get("items")).ok_or_else(|| {
        SchemaError::malformed(entity, format!("field '{}' has unsupported type '{}'", name, type_name))
    })?;

    let annotations = property.get("x-airr").and_then(Value::as_object);
    let flag = |key: &str| {
        annotations
            .and_then(|a| a.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    };

    let miairr = annotations.and_then(|a| a.get("miairr")).and_then(|m| match m {
        Value::String(level) => Some(level.clone()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    });

    Ok(FieldSpec {
        name: name.to_string(),
        field_type,
        queryable: flag("adc-query-support"),
        required,
        nullable: annotations.map_or(true, |_| flag("nullable")),
        miairr,
    })
}

impl SchemaAdapter for AirrSchema {
    fn spec_for_field(&self, name: &str) -> Option<FieldSpec> {
        self.fields.get(name).cloned()
    }

    fn required_fields(&self, profile: &str) -> Vec<String> {
        let keep = |spec: &FieldSpec| match profile {
            PROFILE_AIRR_CORE => spec.required,
            PROFILE_AIRR_SCHEMA => true,
            PROFILE_MIAIRR => spec.miairr.is_some(),
            _ => false,
        };
        self.order
            .iter()
            .filter(|name| self.fields.get(*name).map_or(false, keep))
            .cloned()
            .collect()
    }

    fn template(&self, profile: &str) -> Value {
        let mut skeleton = Map::new();
        for name in self.required_fields(profile) {
            skeleton.insert(name, Value::Null);
        }
        Value::Object(skeleton)
    }

    fn field_order(&self) -> Vec<String> {
        self.order.clone()
    }
}
