//! Per load set digests
//!
//! Summarizes a repertoire's stored records as `{load_set → (count, sha256)}`.
//! The digest ignores store-assigned ids and the order records come back
//! in, so an interrupted-then-resumed load and an uninterrupted one digest
//! identically.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::store::{DocumentStore, FindOptions, StoreResult, ID_FIELD};

use super::transform::{LOAD_SET_FIELD, REPERTOIRE_ID_FIELD};

/// Record count and content hash of one load set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSetDigest {
    pub count: u64,
    pub sha256: String,
}

/// Digest every load set of a repertoire.
///
/// Records without a `load_set` are reported under `u64::MAX`.
pub fn load_set_digests(
    store: &dyn DocumentStore,
    collection: &str,
    repertoire_id: &str,
) -> StoreResult<BTreeMap<u64, LoadSetDigest>> {
    let filter = json!({ REPERTOIRE_ID_FIELD: repertoire_id });
    let mut grouped: BTreeMap<u64, Vec<String>> = BTreeMap::new();

    for document in store.find(collection, &filter, FindOptions::default())? {
        let mut document = document?;
        let load_set = document
            .get(LOAD_SET_FIELD)
            .and_then(Value::as_u64)
            .unwrap_or(u64::MAX);
        if let Some(object) = document.as_object_mut() {
            object.remove(ID_FIELD);
        }
        grouped
            .entry(load_set)
            .or_default()
            .push(canonical(&document).to_string());
    }

    Ok(grouped
        .into_iter()
        .map(|(load_set, mut lines)| {
            lines.sort();
            let mut hasher = Sha256::new();
            for line in &lines {
                hasher.update(line.as_bytes());
                hasher.update(b"\n");
            }
            let digest = LoadSetDigest {
                count: lines.len() as u64,
                sha256: format!("{:x}", hasher.finalize()),
            };
            (load_set, digest)
        })
        .collect())
}

/// Copy of `value` with object keys sorted at every level
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut keys: Vec<&String> = object.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(object.len());
            for key in keys {
                sorted.insert(key.clone(), canonical(&object[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}
