//! In-memory document store
//!
//! Collections live in a `RwLock<HashMap>`. `find` snapshots the matching
//! documents under the read lock, so cursors never hold the lock.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use super::matcher::Matcher;
use super::pipeline::run_pipeline;
use super::{cursor_over, with_id, Cursor, DocumentStore, FindOptions};

/// In-memory document store
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Every document in a collection, in insertion order
    pub fn documents(&self, collection: &str) -> StoreResult<Vec<Value>> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(collections.get(collection).cloned().unwrap_or_default())
    }

    fn snapshot(&self, collection: &str, matcher: &Matcher) -> StoreResult<Vec<Value>> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matcher.matches(d)).cloned().collect())
            .unwrap_or_default())
    }
}

fn poisoned() -> StoreError {
    StoreError::Internal("memory store lock poisoned".to_string())
}

impl DocumentStore for MemoryStore {
    fn find<'a>(&'a self, collection: &str, filter: &Value, options: FindOptions) -> StoreResult<Cursor<'a>> {
        let matcher = Matcher::compile(filter)?;
        let documents = self.snapshot(collection, &matcher)?;
        Ok(cursor_over(documents.into_iter().map(Ok), Matcher::all(), options))
    }

    fn aggregate(&self, collection: &str, pipeline: &[Value]) -> StoreResult<Vec<Value>> {
        let documents = self.documents(collection)?;
        run_pipeline(documents.into_iter().map(Ok), pipeline)
    }

    fn insert_many(&self, collection: &str, documents: Vec<Value>) -> StoreResult<u64> {
        let documents = documents.into_iter().map(with_id).collect::<StoreResult<Vec<_>>>()?;
        let inserted = documents.len() as u64;
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        collections
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
        Ok(inserted)
    }

    fn delete_many(&self, collection: &str, filter: &Value) -> StoreResult<u64> {
        let matcher = Matcher::compile(filter)?;
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = documents.len();
        documents.retain(|d| !matcher.matches(d));
        Ok((before - documents.len()) as u64)
    }

    fn count(&self, collection: &str, filter: &Value) -> StoreResult<u64> {
        let matcher = Matcher::compile(filter)?;
        Ok(self.snapshot(collection, &matcher)?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_many(
                "rearrangement",
                vec![
                    json!({"sequence_id": "s1", "repertoire_id": "r1", "load_set": 0}),
                    json!({"sequence_id": "s2", "repertoire_id": "r1", "load_set": 1}),
                    json!({"sequence_id": "s3", "repertoire_id": "r2", "load_set": 0}),
                ],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_insert_assigns_ids() {
        let store = seeded();
        let docs = store.documents("rearrangement").unwrap();
        assert_eq!(docs.len(), 3);
        assert!(docs.iter().all(|d| d["_id"].is_string()));
    }

    #[test]
    fn test_find_and_count() {
        let store = seeded();
        let filter = json!({"repertoire_id": "r1"});
        assert_eq!(store.count("rearrangement", &filter).unwrap(), 2);

        let ids: Vec<String> = store
            .find("rearrangement", &filter, FindOptions::default().projection(vec!["sequence_id".into()]))
            .unwrap()
            .map(|d| d.unwrap()["sequence_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = seeded();
        let filter = json!({"repertoire_id": "r1", "load_set": {"$gte": 1}});
        assert_eq!(store.delete_many("rearrangement", &filter).unwrap(), 1);
        assert_eq!(store.delete_many("rearrangement", &filter).unwrap(), 0);
        assert_eq!(store.delete_many("missing", &filter).unwrap(), 0);
        assert_eq!(store.count("rearrangement", &json!({})).unwrap(), 2);
    }

    #[test]
    fn test_aggregate() {
        let store = seeded();
        let result = store
            .aggregate(
                "rearrangement",
                &[json!({"$match": {"load_set": 0}}), json!({"$count": "total_records"})],
            )
            .unwrap();
        assert_eq!(result, vec![json!({"total_records": 2})]);
    }

    #[test]
    fn test_missing_collection_is_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.find("nope", &json!({}), FindOptions::default()).unwrap().count(), 0);
    }
}
