//! Document store subsystem for airrdb
//!
//! The loader, the exporter and the aggregation executor reach the database
//! only through `DocumentStore`. Two implementations ship with the crate:
//!
//! - `MemoryStore`: in-process collections, used by tests and dry runs
//! - `JsonlStore`: one checksummed JSON-lines file per collection
//!
//! Both evaluate predicates with the same `Matcher`, so a compiled filter
//! behaves identically against either backend.

mod checksum;
mod errors;
mod jsonl;
mod matcher;
mod memory;
mod pipeline;

use std::time::Instant;

use serde_json::{Map, Value};

pub use errors::{StoreError, StoreResult};
pub use jsonl::JsonlStore;
pub use matcher::{compare_values, values_equal, Matcher};
pub use memory::MemoryStore;
pub use pipeline::run_pipeline;

/// Identifier field every stored document carries
pub const ID_FIELD: &str = "_id";

/// Lazily evaluated query result
pub type Cursor<'a> = Box<dyn Iterator<Item = StoreResult<Value>> + Send + 'a>;

/// Options for `DocumentStore::find`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Documents to skip before the first result
    pub skip: usize,
    /// Maximum number of results
    pub limit: Option<usize>,
    /// Top-level fields to return (plus `_id`); `None` returns whole documents
    pub projection: Option<Vec<String>>,
    /// Checked before every scanned document, matching or not
    pub deadline: Option<Instant>,
}

impl FindOptions {
    /// Set the skip count
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Set the result limit
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the projection
    pub fn projection(mut self, fields: Vec<String>) -> Self {
        self.projection = Some(fields);
        self
    }

    /// Stop the scan with `StoreError::DeadlineExceeded` once `deadline` passes
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Document database seam
pub trait DocumentStore: Send + Sync {
    /// Stream documents matching `filter`
    fn find<'a>(&'a self, collection: &str, filter: &Value, options: FindOptions) -> StoreResult<Cursor<'a>>;

    /// Run an aggregation pipeline
    fn aggregate(&self, collection: &str, pipeline: &[Value]) -> StoreResult<Vec<Value>>;

    /// Insert documents, returning the number inserted. Documents without an
    /// `_id` are assigned one.
    fn insert_many(&self, collection: &str, documents: Vec<Value>) -> StoreResult<u64>;

    /// Delete matching documents, returning the number removed
    fn delete_many(&self, collection: &str, filter: &Value) -> StoreResult<u64>;

    /// Count matching documents
    fn count(&self, collection: &str, filter: &Value) -> StoreResult<u64>;
}

/// Keep `_id` and the listed top-level fields. Dotted names keep their
/// top-level parent.
pub fn project(document: Value, fields: &[String]) -> Value {
    match document {
        Value::Object(object) => {
            let keep = |key: &str| {
                key == ID_FIELD
                    || fields
                        .iter()
                        .any(|f| f == key || f.split('.').next() == Some(key))
            };
            let projected: Map<String, Value> =
                object.into_iter().filter(|(k, _)| keep(k)).collect();
            Value::Object(projected)
        }
        other => other,
    }
}

/// Apply matcher, skip, limit and projection over a document stream.
///
/// Only matching documents count toward skip and limit. An error from the
/// underlying stream is yielded as is and ends the cursor.
pub(crate) fn cursor_over<'a, I>(documents: I, matcher: Matcher, options: FindOptions) -> Cursor<'a>
where
    I: Iterator<Item = StoreResult<Value>> + Send + 'a,
{
    let FindOptions {
        skip,
        limit,
        projection,
        deadline,
    } = options;

    Box::new(ScanCursor {
        documents,
        matcher,
        skip,
        remaining: limit.unwrap_or(usize::MAX),
        projection,
        deadline,
        done: false,
    })
}

struct ScanCursor<I> {
    documents: I,
    matcher: Matcher,
    skip: usize,
    remaining: usize,
    projection: Option<Vec<String>>,
    deadline: Option<Instant>,
    done: bool,
}

impl<I> Iterator for ScanCursor<I>
where
    I: Iterator<Item = StoreResult<Value>>,
{
    type Item = StoreResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == 0 {
            return None;
        }
        loop {
            if matches!(self.deadline, Some(deadline) if Instant::now() >= deadline) {
                self.done = true;
                return Some(Err(StoreError::DeadlineExceeded));
            }
            let document = match self.documents.next()? {
                Ok(document) => document,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            if !self.matcher.matches(&document) {
                continue;
            }
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            self.remaining -= 1;
            return Some(Ok(match &self.projection {
                Some(fields) => project(document, fields),
                None => document,
            }));
        }
    }
}

/// Ensure a document is an object carrying an `_id`
pub(crate) fn with_id(document: Value) -> StoreResult<Value> {
    match document {
        Value::Object(mut object) => {
            if !object.contains_key(ID_FIELD) {
                object.insert(
                    ID_FIELD.to_string(),
                    Value::String(uuid::Uuid::new_v4().to_string()),
                );
            }
            Ok(Value::Object(object))
        }
        other => Err(StoreError::InvalidDocument(format!(
            "expected an object, got {}",
            other
        ))),
    }
}
