//! Streaming export engine
//!
//! Per rearrangement, in cursor order:
//!
//! 1. `sequence_id` falls back to the store id
//! 2. gene-call lists are joined back with `,`
//! 3. internal fields are dropped unless projected
//! 4. missing required and projected fields are backfilled with null
//! 5. the projection is applied
//! 6. the record is written to the sink
//!
//! Repertoire documents only lose their store fields (`_id`, `_etag`) and
//! are backfilled; their projection is the store's, which keeps nested
//! objects whole. Repertoires export as JSON only.
//!
//! Backfill runs per document because sparsity varies per record: the
//! store's projection silently omits absent fields.
//!
//! The request deadline is handed to the store cursor, so it also bounds
//! scanning past non-matching and skipped documents.

use std::time::Instant;

use serde_json::{json, Map, Value};

use crate::filter::JUNCTION_SUFFIXES_FIELD;
use crate::ingest::LOAD_SET_FIELD;
use crate::observability::{log_event_with_fields, Event};
use crate::schema::{SchemaAdapter, REPERTOIRE_ENTITY};
use crate::store::{DocumentStore, FindOptions, StoreError, ID_FIELD};

use super::errors::{ExportError, ExportResult};
use super::json::JsonWriter;
use super::request::{ExportFormat, ExportRequest};
use super::sink::ExportSink;
use super::tsv::TsvWriter;

const SEQUENCE_ID_FIELD: &str = "sequence_id";

/// Gene fields stored as lists, `<prefix>_call`, `<prefix>_gene`, `<prefix>_subgroup`
const GENE_FIELD_PREFIXES: [&str; 4] = ["v", "d", "j", "c"];

/// Revision tag some document stores attach
pub const ETAG_FIELD: &str = "_etag";

/// Fields stored for internal use only
pub const INTERNAL_FIELDS: [&str; 3] = [ID_FIELD, LOAD_SET_FIELD, JUNCTION_SUFFIXES_FIELD];

/// Store fields removed from every repertoire document
pub const REPERTOIRE_INTERNAL_FIELDS: [&str; 2] = [ID_FIELD, ETAG_FIELD];

/// Format-specific framing of a record stream
pub(crate) trait RecordWriter {
    fn begin(&mut self, sink: &mut dyn ExportSink) -> ExportResult<()>;
    fn write_record(&mut self, sink: &mut dyn ExportSink, record: &Map<String, Value>) -> ExportResult<()>;
    fn end(&mut self, sink: &mut dyn ExportSink) -> ExportResult<()>;
}

/// Outcome of a finished export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub records: u64,
    pub format: ExportFormat,
}

/// Streams query results into a sink
pub struct ExportEngine<'a> {
    store: &'a dyn DocumentStore,
    schema: &'a dyn SchemaAdapter,
}

impl<'a> ExportEngine<'a> {
    pub fn new(store: &'a dyn DocumentStore, schema: &'a dyn SchemaAdapter) -> Self {
        Self { store, schema }
    }

    /// Stream every matching record into `sink`.
    ///
    /// On success the sink is finished. On error it is aborted, and the
    /// error is returned.
    pub fn stream(&self, request: &ExportRequest, sink: &mut dyn ExportSink) -> ExportResult<ExportSummary> {
        log_event_with_fields(
            Event::ExportStart,
            &[
                ("collection", &request.collection),
                ("format", request.format.as_str()),
                ("predicate", request.predicate.as_ref().map_or("{}", |p| p.as_str())),
            ],
        );

        let result = self
            .write_records(request, sink)
            .and_then(|records| sink.finish().map(|_| records).map_err(ExportError::from));

        match result {
            Ok(records) => {
                log_event_with_fields(
                    Event::ExportComplete,
                    &[
                        ("collection", &request.collection),
                        ("records", &records.to_string()),
                    ],
                );
                Ok(ExportSummary {
                    records,
                    format: request.format,
                })
            }
            Err(err) => {
                let reason = err.to_string();
                sink.abort(&reason);
                log_event_with_fields(
                    Event::ExportAborted,
                    &[("collection", &request.collection), ("error", &reason)],
                );
                Err(err)
            }
        }
    }

    fn write_records(&self, request: &ExportRequest, sink: &mut dyn ExportSink) -> ExportResult<u64> {
        let projection = request.projection.clone().filter(|p| !p.is_empty());
        if is_repertoire(request) && request.format == ExportFormat::Tsv {
            return Err(ExportError::InvalidRequest(format!(
                "{} records export as JSON only",
                REPERTOIRE_ENTITY
            )));
        }

        let mut writer: Box<dyn RecordWriter> = match request.format {
            ExportFormat::Json => Box::new(JsonWriter::new(&request.entity, &request.info)),
            ExportFormat::Tsv => Box::new(TsvWriter::new(self.schema.field_order(), projection.clone())),
        };

        let filter = request
            .predicate
            .as_ref()
            .map(|p| p.document().clone())
            .unwrap_or_else(|| json!({}));
        let mut options = FindOptions::default().skip(request.from);
        if let Some(size) = request.size {
            options = options.limit(size);
        }
        if let Some(fields) = &projection {
            options = options.projection(fields.clone());
        }
        if let Some(deadline) = request.deadline {
            options = options.deadline(deadline);
        }

        check_deadline(request.deadline, 0)?;
        let cursor = self.store.find(&request.collection, &filter, options)?;
        writer.begin(sink)?;

        let mut records = 0u64;
        for document in cursor {
            check_deadline(request.deadline, records)?;
            let document = document.map_err(|e| match e {
                StoreError::DeadlineExceeded => ExportError::DeadlineExceeded { exported: records },
                other => ExportError::Store(other),
            })?;
            let Value::Object(object) = document else {
                continue;
            };
            let record = self.clean_record(object, request, projection.as_deref());
            writer.write_record(sink, &record)?;
            records += 1;
        }

        writer.end(sink)?;
        Ok(records)
    }

    /// Turn a stored document into an output record
    pub fn clean_record(
        &self,
        record: Map<String, Value>,
        request: &ExportRequest,
        projection: Option<&[String]>,
    ) -> Map<String, Value> {
        if is_repertoire(request) {
            let mut record = record;
            record.retain(|key, _| !REPERTOIRE_INTERNAL_FIELDS.contains(&key.as_str()));
            backfill(&mut record, request);
            return record;
        }
        self.clean_rearrangement(record, request, projection)
    }

    fn clean_rearrangement(
        &self,
        mut record: Map<String, Value>,
        request: &ExportRequest,
        projection: Option<&[String]>,
    ) -> Map<String, Value> {
        if self.schema.spec_for_field(SEQUENCE_ID_FIELD).is_some() {
            let missing = match record.get(SEQUENCE_ID_FIELD) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            };
            if missing {
                if let Some(id) = record.get(ID_FIELD).cloned() {
                    record.insert(SEQUENCE_ID_FIELD.to_string(), id);
                }
            }
        }

        for prefix in GENE_FIELD_PREFIXES {
            for suffix in ["call", "gene", "subgroup"] {
                let field = format!("{}_{}", prefix, suffix);
                if let Some(Value::Array(items)) = record.get(&field) {
                    let joined = items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => s.clone(),
                            Value::Null => String::new(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(",");
                    record.insert(field, Value::String(joined));
                }
            }
        }

        record.retain(|key, _| {
            !INTERNAL_FIELDS.contains(&key.as_str()) || request.is_projected(key)
        });
        backfill(&mut record, request);

        if let Some(projection) = projection {
            record.retain(|key, _| projection.iter().any(|f| f == key));
        }
        record
    }
}

fn is_repertoire(request: &ExportRequest) -> bool {
    request.entity == REPERTOIRE_ENTITY
}

/// Null for every required or projected top-level field the record lacks.
/// Dotted projections name nested values and are not backfilled.
fn backfill(record: &mut Map<String, Value>, request: &ExportRequest) {
    let projected = request.projection.iter().flatten();
    for field in request.required_fields.iter().chain(projected) {
        if !field.contains('.') && !record.contains_key(field) {
            record.insert(field.clone(), Value::Null);
        }
    }
}

fn check_deadline(deadline: Option<Instant>, exported: u64) -> ExportResult<()> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(ExportError::DeadlineExceeded { exported }),
        _ => Ok(()),
    }
}
