//! Facet result folding
//!
//! Grouped results key on the raw field value, so an array-valued field
//! produces one group per distinct array. Folding turns those groups into
//! one entry per distinct scalar value in two phases:
//!
//! 1. Within a group: flatten the key fully, drop duplicates, and give each
//!    remaining value the group's full count.
//! 2. Across groups: sum counts of equal values, keeping first-seen order.
//!
//! Phase 1 must finish before phase 2. Summing first would count a document
//! once per repeated occurrence of a value in its own array.

use serde_json::{Map, Value};

use crate::store::values_equal;

/// One folded facet value
#[derive(Debug, Clone, PartialEq)]
pub struct FacetEntry {
    pub value: Value,
    pub count: u64,
}

impl FacetEntry {
    /// Render as `{<field>: value, "count": n}`
    pub fn to_value(&self, field: &str) -> Value {
        let mut entry = Map::new();
        entry.insert(field.to_string(), self.value.clone());
        entry.insert("count".to_string(), Value::from(self.count));
        Value::Object(entry)
    }
}

/// Fold raw `{"_id": key, "count": n}` group records
pub fn fold_facets(records: &[Value]) -> Vec<FacetEntry> {
    let mut merged: Vec<FacetEntry> = Vec::new();

    for record in records {
        let count = record.get("count").and_then(count_of).unwrap_or(0);
        let key = record.get("_id").unwrap_or(&Value::Null);

        let mut flat = Vec::new();
        flatten(key, &mut flat);
        let mut unique: Vec<&Value> = Vec::with_capacity(flat.len());
        for value in flat {
            if !unique.iter().any(|u| values_equal(u, value)) {
                unique.push(value);
            }
        }

        for value in unique {
            match merged.iter_mut().find(|e| values_equal(&e.value, value)) {
                Some(entry) => entry.count += count,
                None => merged.push(FacetEntry {
                    value: value.clone(),
                    count,
                }),
            }
        }
    }

    merged
}

fn count_of(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

/// Empty arrays contribute nothing
fn flatten<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten(item, out);
            }
        }
        other => out.push(other),
    }
}
