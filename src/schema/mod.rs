//! Schema subsystem for airrdb
//!
//! AIRR field types are resolved once, at load time, into a closed set of
//! type tags. Everything downstream (filter compilation, TSV value mapping,
//! export backfill) consults the schema through `SchemaAdapter`.
//!
//! # Design Principles
//!
//! - Explicit field types, no runtime `typeof` dispatch
//! - Declaration order preserved for output column order
//! - Unknown fields are custom fields, not errors

mod adapter;
mod airr;
mod errors;
mod types;

pub use adapter::{SchemaAdapter, PROFILE_AIRR_CORE, PROFILE_AIRR_SCHEMA, PROFILE_MIAIRR};
pub use airr::{AirrSchema, REARRANGEMENT_ENTITY, REPERTOIRE_ENTITY};
pub use errors::{SchemaError, SchemaErrorCode, SchemaResult};
pub use types::{FieldSpec, FieldType};
