//! Filter compiler
//!
//! Turns an ADC filter tree into a document-store predicate. Compilation
//! walks the wire `Value` directly in recursive-descent order: the first
//! error anywhere in the tree aborts the whole compilation, so a partial
//! predicate is never produced.
//!
//! Per comparison node the checks run in this order:
//!
//! 1. `op` / `content` presence
//! 2. field resolution against the schema (custom fields are typed by
//!    their literal value)
//! 3. query-support check when `validate_required` is set
//! 4. value type check against the resolved type (array values skip it)
//! 5. operator-specific field/value requirements

use serde_json::{Map, Value};

use crate::observability::{log_event_with_fields, Event};
use crate::schema::{FieldSpec, FieldType, SchemaAdapter};

use super::errors::{FilterError, FilterResult};
use super::expr::FilterExpr;
use super::op::FilterOp;
use super::predicate::CompiledPredicate;

/// Field whose `contains` queries are served by the suffix index
pub const JUNCTION_AA_FIELD: &str = "junction_aa";

/// Precomputed suffix index built from `junction_aa` at load time
pub const JUNCTION_SUFFIXES_FIELD: &str = "junction_suffixes";

/// Minimum `contains` length on `junction_aa`; matches the shortest stored suffix
pub const MIN_JUNCTION_CONTAINS_LEN: usize = 4;

/// Compiler switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Reject fields the schema does not mark as query-supported
    pub validate_required: bool,
    /// Reject generic `contains` queries
    pub disable_contains: bool,
}

/// Compiles ADC filters against a schema snapshot
pub struct FilterCompiler<'a> {
    schema: &'a dyn SchemaAdapter,
    options: CompilerOptions,
}

/// Field reference after schema resolution
struct ResolvedField<'v> {
    name: Option<&'v str>,
    field_type: Option<FieldType>,
}

impl ResolvedField<'_> {
    fn name(&self) -> &str {
        self.name.unwrap_or("")
    }

    /// Type scalar values are checked against
    fn query_type(&self) -> Option<&FieldType> {
        self.field_type.as_ref().map(FieldType::query_type)
    }
}

impl<'a> FilterCompiler<'a> {
    /// Create a compiler over a schema
    pub fn new(schema: &'a dyn SchemaAdapter, options: CompilerOptions) -> Self {
        Self { schema, options }
    }

    /// Returns the active options
    pub fn options(&self) -> CompilerOptions {
        self.options
    }

    /// Compile a wire filter
    pub fn compile(&self, filter: &Value) -> FilterResult<CompiledPredicate> {
        self.compile_node(filter).map(CompiledPredicate::new)
    }

    /// Compile a typed filter expression
    pub fn compile_expr(&self, expr: &FilterExpr) -> FilterResult<CompiledPredicate> {
        self.compile(&expr.to_value())
    }

    fn compile_node(&self, node: &Value) -> FilterResult<Value> {
        let node = node
            .as_object()
            .ok_or_else(|| FilterError::malformed("filter must be an object"))?;

        let op_name = match node.get("op") {
            Some(Value::String(op)) if !op.is_empty() => op.as_str(),
            _ => return Err(FilterError::malformed("missing op")),
        };

        let content = match node.get("content") {
            None | Some(Value::Null) => return Err(FilterError::malformed("missing content")),
            Some(Value::Array(items)) if items.is_empty() => {
                return Err(FilterError::malformed("missing content"))
            }
            Some(Value::Object(fields)) if fields.is_empty() => {
                return Err(FilterError::malformed("missing content"))
            }
            Some(content) => content,
        };

        let op = FilterOp::parse(op_name).ok_or_else(|| {
            FilterError::malformed(format!("unknown operator in filters: {}", op_name))
        })?;

        if op.is_logical() {
            self.compile_logical(op, content)
        } else {
            self.compile_comparison(op, content)
        }
    }

    fn compile_logical(&self, op: FilterOp, content: &Value) -> FilterResult<Value> {
        let children = content.as_array().ok_or_else(|| {
            FilterError::malformed(format!("content for '{}' operator is not an array", op))
        })?;
        if children.len() < 2 {
            return Err(FilterError::malformed(format!(
                "content for '{}' operator needs at least 2 elements",
                op
            )));
        }

        let mut compiled = Vec::with_capacity(children.len());
        for child in children {
            compiled.push(self.compile_node(child)?);
        }

        let keyword = op.keyword().unwrap_or("$and");
        Ok(single(keyword, Value::Array(compiled)))
    }

    fn compile_comparison(&self, op: FilterOp, content: &Value) -> FilterResult<Value> {
        let content = content.as_object().ok_or_else(|| {
            FilterError::malformed(format!("content for '{}' operator must be an object", op))
        })?;

        let field_name = match content.get("field") {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) => Some(name.as_str()),
            Some(_) => return Err(FilterError::malformed("field name must be a string")),
        };
        let value = content.get("value").filter(|v| !v.is_null());

        let spec = match field_name {
            Some(name) => self.resolve_spec(name)?,
            None => None,
        };
        let field = ResolvedField {
            name: field_name,
            field_type: spec
                .map(|s| s.field_type)
                .or_else(|| value.and_then(FieldType::of_value)),
        };

        if let Some(value) = value {
            if !value.is_array() {
                check_scalar_type(&field, value)?;
            }
        }

        match op {
            FilterOp::Eq => {
                let (name, value) = require_field_and_value(op, &field, value)?;
                Ok(single(name, value.clone()))
            }
            FilterOp::Ne | FilterOp::Lt | FilterOp::Lte | FilterOp::Gt | FilterOp::Gte => {
                let (name, value) = require_field_and_value(op, &field, value)?;
                let keyword = op.keyword().unwrap_or("$eq");
                Ok(single(name, single(keyword, value.clone())))
            }
            FilterOp::Contains => self.compile_contains(&field, value),
            FilterOp::IsMissing | FilterOp::IsNotMissing => {
                let name = field.name.ok_or_else(|| missing_field(op))?;
                let exists = op == FilterOp::IsNotMissing;
                Ok(single(name, single("$exists", Value::Bool(exists))))
            }
            FilterOp::In | FilterOp::Exclude => {
                let value = value.ok_or_else(|| missing_value(op))?;
                if !value.is_array() {
                    return Err(FilterError::type_mismatch(
                        field.name(),
                        "array",
                        FieldType::name_of_value(value),
                    ));
                }
                let name = field.name.ok_or_else(|| missing_field(op))?;
                let keyword = op.keyword().unwrap_or("$in");
                Ok(single(name, single(keyword, value.clone())))
            }
            FilterOp::And | FilterOp::Or => Err(FilterError::malformed(format!(
                "operator '{}' cannot compare a field",
                op
            ))),
        }
    }

    fn compile_contains(&self, field: &ResolvedField<'_>, value: Option<&Value>) -> FilterResult<Value> {
        let op = FilterOp::Contains;
        match field.query_type() {
            Some(FieldType::String) => {}
            other => {
                return Err(FilterError::type_mismatch(
                    field.name(),
                    "string",
                    other.map_or("null", FieldType::type_name),
                ))
            }
        }
        let name = field.name.ok_or_else(|| missing_field(op))?;
        let value = value.ok_or_else(|| missing_value(op))?;
        let text = value.as_str().ok_or_else(|| {
            FilterError::type_mismatch(name, "string", FieldType::name_of_value(value))
        })?;

        if name == JUNCTION_AA_FIELD {
            if text.chars().count() < MIN_JUNCTION_CONTAINS_LEN {
                return Err(FilterError::value_too_short(name, MIN_JUNCTION_CONTAINS_LEN));
            }
            let prefix = format!("^{}", regex::escape(text));
            return Ok(single(JUNCTION_SUFFIXES_FIELD, single("$regex", Value::String(prefix))));
        }

        if self.options.disable_contains {
            return Err(FilterError::operator_disabled(op.as_str(), name));
        }

        let mut pattern = Map::new();
        pattern.insert("$regex".to_string(), Value::String(regex::escape(text)));
        pattern.insert("$options".to_string(), Value::String("i".to_string()));
        Ok(single(name, Value::Object(pattern)))
    }

    fn resolve_spec(&self, name: &str) -> FilterResult<Option<FieldSpec>> {
        if name.is_empty() {
            return Err(FilterError::malformed("field name is empty"));
        }
        if name.starts_with('$') {
            return Err(FilterError::malformed(format!(
                "field name contains invalid symbols: {}",
                name
            )));
        }

        let spec = self.schema.spec_for_field(name);
        if spec.is_none() {
            log_event_with_fields(Event::QueryCustomField, &[("field", name)]);
        }

        if self.options.validate_required && !spec.as_ref().map_or(false, |s| s.queryable) {
            return Err(FilterError::unsupported_field(name));
        }

        Ok(spec)
    }
}

fn check_scalar_type(field: &ResolvedField<'_>, value: &Value) -> FilterResult<()> {
    let actual = FieldType::name_of_value(value);
    let ok = match field.query_type() {
        Some(FieldType::Integer) | Some(FieldType::Number) => value.is_number(),
        Some(FieldType::Boolean) => value.is_boolean(),
        Some(FieldType::String) => value.is_string(),
        Some(other) => return Err(FilterError::unsupported_type(field.name(), other.type_name())),
        None => return Err(FilterError::unsupported_type(field.name(), actual)),
    };
    if ok {
        Ok(())
    } else {
        let expected = field.query_type().map_or(actual, FieldType::type_name);
        Err(FilterError::type_mismatch(field.name(), expected, actual))
    }
}

fn require_field_and_value<'v>(
    op: FilterOp,
    field: &ResolvedField<'v>,
    value: Option<&'v Value>,
) -> FilterResult<(&'v str, &'v Value)> {
    let name = field.name.ok_or_else(|| missing_field(op))?;
    let value = value.ok_or_else(|| missing_value(op))?;
    Ok((name, value))
}

fn missing_field(op: FilterOp) -> FilterError {
    FilterError::malformed(format!("missing field for '{}' operator", op))
}

fn missing_value(op: FilterOp) -> FilterError {
    FilterError::malformed(format!("missing value for '{}' operator", op))
}

fn single(key: &str, value: Value) -> Value {
    let mut document = Map::new();
    document.insert(key.to_string(), value);
    Value::Object(document)
}
