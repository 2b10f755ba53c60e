//! Repertoire metadata loading
//!
//! Repertoire metadata arrives as whole JSON documents, either a bare array
//! or an AIRR file `{"Repertoire": [...]}`. Each document replaces every
//! stored document with the same `repertoire_id`, so loading the same
//! metadata twice leaves one copy.
//!
//! The whole batch is validated before the store is touched.

use std::collections::HashSet;

use serde_json::{json, Map, Value};

use crate::observability::{log_event_with_fields, Event};
use crate::schema::REPERTOIRE_ENTITY;
use crate::store::DocumentStore;

use super::errors::{LoaderError, LoaderResult};
use super::transform::{clean_object, REPERTOIRE_ID_FIELD};

/// Outcome of a metadata load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepertoireLoadSummary {
    /// Documents inserted
    pub loaded: u64,
    /// Previously stored documents removed
    pub replaced: u64,
}

/// Extract repertoire documents from a metadata file body
pub fn parse_repertoire_metadata(body: Value) -> LoaderResult<Vec<Map<String, Value>>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove(REPERTOIRE_ENTITY) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(LoaderError::invalid_record(format!(
                    "Metadata object has no '{}' array",
                    REPERTOIRE_ENTITY
                )))
            }
        },
        _ => {
            return Err(LoaderError::invalid_record(
                "Metadata must be an array or an object",
            ))
        }
    };

    let mut seen = HashSet::new();
    let mut repertoires = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(object) = item else {
            return Err(LoaderError::invalid_record(format!(
                "Repertoire {} is not an object",
                index
            )));
        };
        let repertoire_id = match object.get(REPERTOIRE_ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => {
                return Err(LoaderError::invalid_record(format!(
                    "Repertoire {} has no repertoire_id",
                    index
                )))
            }
        };
        if !seen.insert(repertoire_id.clone()) {
            return Err(LoaderError::invalid_record(format!(
                "Repertoire '{}' appears more than once",
                repertoire_id
            )));
        }
        repertoires.push(object);
    }
    Ok(repertoires)
}

/// Replace each repertoire's stored metadata document.
///
/// Per repertoire: delete by `repertoire_id`, strip null and empty values,
/// insert. A failure part way leaves earlier repertoires replaced; running
/// the load again converges.
pub fn load_repertoire_metadata(
    store: &dyn DocumentStore,
    collection: &str,
    repertoires: Vec<Map<String, Value>>,
) -> LoaderResult<RepertoireLoadSummary> {
    let mut summary = RepertoireLoadSummary::default();

    for mut repertoire in repertoires {
        let repertoire_id = match repertoire.get(REPERTOIRE_ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => return Err(LoaderError::invalid_record("Repertoire has no repertoire_id")),
        };

        let removed = store
            .delete_many(collection, &json!({ REPERTOIRE_ID_FIELD: &repertoire_id }))
            .map_err(|e| LoaderError::store(format!("Delete of repertoire {} failed", repertoire_id), e))?;

        clean_object(&mut repertoire);
        store
            .insert_many(collection, vec![Value::Object(repertoire)])
            .map_err(|e| LoaderError::store(format!("Insert of repertoire {} failed", repertoire_id), e))?;

        log_event_with_fields(
            Event::RepertoireLoaded,
            &[
                ("collection", collection),
                ("repertoire_id", &repertoire_id),
                ("replaced", &removed.to_string()),
            ],
        );
        summary.loaded += 1;
        summary.replaced += removed;
    }

    log_event_with_fields(
        Event::RepertoireMetadataComplete,
        &[
            ("collection", collection),
            ("loaded", &summary.loaded.to_string()),
            ("replaced", &summary.replaced.to_string()),
        ],
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::LoaderErrorCode;
    use crate::store::MemoryStore;

    const COLLECTION: &str = "repertoire";

    fn metadata() -> Value {
        json!({"Info": {"title": "study"}, "Repertoire": [
            {"repertoire_id": "r1", "study": {"study_id": "PRJ1", "pub_ids": ""},
             "subject": {"subject_id": "S1", "age": null}, "sample": [{"sample_id": "a", "tissue": ""}]},
            {"repertoire_id": "r2", "study": {"study_id": "PRJ1"}}
        ]})
    }

    #[test]
    fn test_parse_airr_file_and_bare_array() {
        assert_eq!(parse_repertoire_metadata(metadata()).unwrap().len(), 2);
        let bare = parse_repertoire_metadata(json!([{"repertoire_id": "r1"}])).unwrap();
        assert_eq!(bare[0]["repertoire_id"], "r1");
    }

    #[test]
    fn test_parse_rejects_unusable_documents() {
        for body in [
            json!("r1"),
            json!({"Rearrangement": []}),
            json!([{"study": {}}]),
            json!([{"repertoire_id": ""}]),
            json!([1]),
            json!([{"repertoire_id": "r1"}, {"repertoire_id": "r1"}]),
        ] {
            let err = parse_repertoire_metadata(body).unwrap_err();
            assert_eq!(err.code(), LoaderErrorCode::AdcInvalidRecord);
        }
    }

    #[test]
    fn test_load_cleans_and_replaces() {
        let store = MemoryStore::new();
        let repertoires = parse_repertoire_metadata(metadata()).unwrap();

        let first = load_repertoire_metadata(&store, COLLECTION, repertoires.clone()).unwrap();
        assert_eq!(first, RepertoireLoadSummary { loaded: 2, replaced: 0 });

        let second = load_repertoire_metadata(&store, COLLECTION, repertoires).unwrap();
        assert_eq!(second, RepertoireLoadSummary { loaded: 2, replaced: 2 });
        assert_eq!(store.count(COLLECTION, &json!({})).unwrap(), 2);

        let stored = store.documents(COLLECTION).unwrap();
        let r1 = stored.iter().find(|d| d["repertoire_id"] == "r1").unwrap();
        assert!(r1["study"].get("pub_ids").is_none());
        assert!(r1["subject"].get("age").is_none());
        assert!(r1["sample"][0].get("tissue").is_none());
        assert_eq!(r1["sample"][0]["sample_id"], "a");
    }

    #[test]
    fn test_load_leaves_other_repertoires() {
        let store = MemoryStore::new();
        store
            .insert_many(COLLECTION, vec![json!({"repertoire_id": "r9"})])
            .unwrap();
        let repertoires = parse_repertoire_metadata(json!([{"repertoire_id": "r1"}])).unwrap();
        load_repertoire_metadata(&store, COLLECTION, repertoires).unwrap();
        assert_eq!(store.count(COLLECTION, &json!({"repertoire_id": "r9"})).unwrap(), 1);
    }
}
