//! Export Backfill Tests
//!
//! Tests for export invariants:
//! - A required field a record lacks is emitted as an empty TSV cell and
//!   as JSON null
//! - Zero matches still produce a complete document
//! - Internal fields never leak unless projected
//! - A failed export never produces the final file
//! - Repertoire documents keep their shape and lose only store fields

use std::fs;
use std::time::Instant;

use airrdb::export::{
    partial_path_for, ExportEngine, ExportError, ExportFormat, ExportRequest, ExportSink, FileSink,
    WriterSink, INTERNAL_FIELDS,
};
use airrdb::filter::{CompilerOptions, FilterCompiler};
use airrdb::ingest::{load_repertoire_metadata, parse_repertoire_metadata};
use airrdb::schema::{
    AirrSchema, SchemaAdapter, PROFILE_AIRR_CORE, REARRANGEMENT_ENTITY, REPERTOIRE_ENTITY,
};
use airrdb::store::{DocumentStore, MemoryStore};
use serde_json::{json, Value};
use tempfile::TempDir;

const COLLECTION: &str = "rearrangement";

// =============================================================================
// Helper Functions
// =============================================================================

fn schema() -> AirrSchema {
    AirrSchema::builtin_rearrangement().unwrap()
}

/// Loaded-shape documents: internal fields present, `junction_aa` sparse
fn store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .insert_many(
            COLLECTION,
            vec![
                json!({"_id": "a1", "sequence_id": "s1", "repertoire_id": "r1", "load_set": 0,
                       "v_call": ["TRBV1*01", "TRBV2*01"], "v_gene": ["TRBV1", "TRBV2"],
                       "junction_aa": "CASSQF", "junction_suffixes": ["CASSQF", "ASSQF", "SSQF"],
                       "productive": true}),
                json!({"_id": "a2", "sequence_id": "s2", "repertoire_id": "r1", "load_set": 0,
                       "v_call": "TRBV5-1*01", "productive": false}),
                json!({"_id": "a3", "sequence_id": "s3", "repertoire_id": "r2", "load_set": 1,
                       "v_call": "TRAV1*01", "junction_aa": "CAVRD"}),
            ],
        )
        .unwrap();
    store
}

fn request_for(repertoire_id: &str, format: ExportFormat) -> ExportRequest {
    let schema = schema();
    let predicate = FilterCompiler::new(&schema, CompilerOptions::default())
        .compile(&json!({"op": "=", "content": {"field": "repertoire_id", "value": repertoire_id}}))
        .unwrap();
    ExportRequest::new(COLLECTION, REARRANGEMENT_ENTITY)
        .predicate(predicate)
        .format(format)
        .info(json!({"title": "airrdb test", "version": 1}))
}

fn run(store: &dyn DocumentStore, request: &ExportRequest) -> String {
    let schema = schema();
    let mut sink = WriterSink::new(Vec::new());
    ExportEngine::new(store, &schema).stream(request, &mut sink).unwrap();
    assert!(sink.is_finished());
    String::from_utf8(sink.into_inner()).unwrap()
}

fn run_json(store: &dyn DocumentStore, request: &ExportRequest) -> Value {
    serde_json::from_str(&run(store, request)).unwrap()
}

// =============================================================================
// Backfill Tests
// =============================================================================

#[test]
fn test_tsv_missing_required_field_is_empty_cell() {
    let store = store();
    let request = request_for("r1", ExportFormat::Tsv)
        .projection(vec!["sequence_id".into(), "v_call".into()])
        .required_fields(vec!["junction_aa".into()]);

    // junction_aa is required but not projected, so it is not a column
    let text = run(&store, &request);
    assert_eq!(text, "sequence_id\tv_call\ns1\tTRBV1*01,TRBV2*01\ns2\tTRBV5-1*01\n");

    let request = request_for("r1", ExportFormat::Tsv)
        .projection(vec!["sequence_id".into(), "v_call".into(), "junction_aa".into()])
        .required_fields(vec!["junction_aa".into()]);
    let text = run(&store, &request);
    assert_eq!(
        text,
        "sequence_id\tv_call\tjunction_aa\ns1\tTRBV1*01,TRBV2*01\tCASSQF\ns2\tTRBV5-1*01\t\n"
    );
}

#[test]
fn test_json_missing_required_field_is_null() {
    let store = store();
    let schema = schema();
    let request = request_for("r1", ExportFormat::Json).include_profile(&schema, PROFILE_AIRR_CORE);

    let output = run_json(&store, &request);
    let records = output[REARRANGEMENT_ENTITY].as_array().unwrap();
    assert_eq!(records.len(), 2);

    let second = records[1].as_object().unwrap();
    assert_eq!(second.get("junction_aa"), Some(&Value::Null));
    assert_eq!(second.get("d_call"), Some(&Value::Null));
    for field in schema.required_fields(PROFILE_AIRR_CORE) {
        assert!(second.contains_key(&field), "missing {}", field);
    }
}

/// A requested field is backfilled even without a profile.
#[test]
fn test_json_projected_field_backfilled() {
    let store = MemoryStore::new();
    store
        .insert_many(COLLECTION, vec![json!({"sequence_id": "s1", "repertoire_id": "r1"})])
        .unwrap();
    let request = ExportRequest::new(COLLECTION, REARRANGEMENT_ENTITY)
        .projection(vec!["sequence_id".into(), "sequence".into()]);

    let output = run_json(&store, &request);
    assert_eq!(
        output[REARRANGEMENT_ENTITY],
        json!([{"sequence_id": "s1", "sequence": null}])
    );
}

#[test]
fn test_core_profile_tsv_has_every_core_column() {
    let store = store();
    let schema = schema();
    let request = request_for("r2", ExportFormat::Tsv)
        .projection(vec!["sequence_id".into()])
        .include_profile(&schema, PROFILE_AIRR_CORE);

    let text = run(&store, &request);
    let mut lines = text.lines();
    let header: Vec<&str> = lines.next().unwrap().split('\t').collect();
    assert_eq!(header, schema.required_fields(PROFILE_AIRR_CORE));

    let row: Vec<&str> = lines.next().unwrap().split('\t').collect();
    assert_eq!(row.len(), header.len());
    let junction_aa = header.iter().position(|c| *c == "junction_aa").unwrap();
    assert_eq!(row[junction_aa], "CAVRD");
    let d_call = header.iter().position(|c| *c == "d_call").unwrap();
    assert_eq!(row[d_call], "");
}

// =============================================================================
// Record Cleaning Tests
// =============================================================================

#[test]
fn test_internal_fields_hidden_unless_projected() {
    let store = store();
    let output = run_json(&store, &request_for("r1", ExportFormat::Json));
    for record in output[REARRANGEMENT_ENTITY].as_array().unwrap() {
        for field in INTERNAL_FIELDS {
            assert!(record.get(field).is_none(), "{} leaked", field);
        }
    }

    let request = request_for("r1", ExportFormat::Json)
        .projection(vec!["sequence_id".into(), "load_set".into()]);
    let output = run_json(&store, &request);
    assert_eq!(
        output[REARRANGEMENT_ENTITY],
        json!([
            {"sequence_id": "s1", "load_set": 0},
            {"sequence_id": "s2", "load_set": 0}
        ])
    );
}

#[test]
fn test_gene_lists_joined() {
    let store = store();
    let output = run_json(&store, &request_for("r1", ExportFormat::Json));
    let first = &output[REARRANGEMENT_ENTITY][0];
    assert_eq!(first["v_call"], json!("TRBV1*01,TRBV2*01"));
    assert_eq!(first["v_gene"], json!("TRBV1,TRBV2"));
}

#[test]
fn test_paging() {
    let store = store();
    let request = ExportRequest::new(COLLECTION, REARRANGEMENT_ENTITY)
        .projection(vec!["sequence_id".into()])
        .from(1)
        .size(1);
    let output = run_json(&store, &request);
    assert_eq!(output[REARRANGEMENT_ENTITY], json!([{"sequence_id": "s2"}]));
}

// =============================================================================
// Zero Match Tests
// =============================================================================

#[test]
fn test_zero_match_json_envelope() {
    let store = store();
    let output = run_json(&store, &request_for("nobody", ExportFormat::Json));
    assert_eq!(
        output,
        json!({"Info": {"title": "airrdb test", "version": 1}, "Rearrangement": []})
    );
}

#[test]
fn test_zero_match_tsv_is_header_only() {
    let store = store();
    let request = request_for("nobody", ExportFormat::Tsv)
        .projection(vec!["sequence_id".into(), "productive".into()]);
    assert_eq!(run(&store, &request), "sequence_id\tproductive\n");
}

#[test]
fn test_zero_match_from_empty_collection() {
    let store = MemoryStore::new();
    let output = run_json(&store, &ExportRequest::new(COLLECTION, REARRANGEMENT_ENTITY));
    assert_eq!(output, json!({"Info": {}, "Rearrangement": []}));
}

// =============================================================================
// Sink Completion Tests
// =============================================================================

#[test]
fn test_file_sink_renamed_on_success() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("export.tsv");
    let store = store();
    let schema = schema();

    let request = request_for("r2", ExportFormat::Tsv).projection(vec!["sequence_id".into()]);
    let mut sink = FileSink::create(&path).unwrap();
    let summary = ExportEngine::new(&store, &schema).stream(&request, &mut sink).unwrap();

    assert_eq!(summary.records, 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), "sequence_id\ns3\n");
    assert!(!partial_path_for(&path).exists());
}

#[test]
fn test_file_sink_left_partial_on_deadline() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("export.json");
    let store = store();
    let schema = schema();

    let request = request_for("r1", ExportFormat::Json).deadline(Instant::now());
    let mut sink = FileSink::create(&path).unwrap();
    let err = ExportEngine::new(&store, &schema).stream(&request, &mut sink).unwrap_err();

    assert!(matches!(err, ExportError::DeadlineExceeded { exported: 0 }));
    assert!(!path.exists());
    assert!(sink.partial_path().exists());
    assert!(sink.write_all(b"late").is_err());
}

#[test]
fn test_writer_sink_records_abort_reason() {
    let store = store();
    let schema = schema();
    let request = request_for("r1", ExportFormat::Tsv).deadline(Instant::now());

    let mut sink = WriterSink::new(Vec::new());
    assert!(ExportEngine::new(&store, &schema).stream(&request, &mut sink).is_err());
    assert!(!sink.is_finished());
    assert!(sink.abort_reason().is_some());
}

// =============================================================================
// Repertoire Tests
// =============================================================================

#[test]
fn test_repertoire_metadata_round_trip() {
    let store = MemoryStore::new();
    let metadata = json!({"Repertoire": [
        {"repertoire_id": "r1", "subject": {"subject_id": "S1", "sex": ""},
         "sample": [{"sample_id": "a", "v_call": "not a gene list"}]},
        {"repertoire_id": "r2", "subject": {"subject_id": "S2"}}
    ]});
    let repertoires = parse_repertoire_metadata(metadata).unwrap();
    load_repertoire_metadata(&store, "repertoire", repertoires.clone()).unwrap();
    load_repertoire_metadata(&store, "repertoire", repertoires).unwrap();

    let schema = schema();
    let predicate = FilterCompiler::new(&schema, CompilerOptions::default())
        .compile(&json!({"op": "=", "content": {"field": "repertoire_id", "value": "r1"}}))
        .unwrap();
    let request = ExportRequest::new("repertoire", REPERTOIRE_ENTITY)
        .predicate(predicate)
        .required_fields(vec!["repertoire_id".into(), "study".into()]);

    let output = run_json(&store, &request);
    assert_eq!(
        output,
        json!({"Info": {}, "Repertoire": [
            {"repertoire_id": "r1", "subject": {"subject_id": "S1"},
             "sample": [{"sample_id": "a", "v_call": "not a gene list"}], "study": null}
        ]})
    );
}
