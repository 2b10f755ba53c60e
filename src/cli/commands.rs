//! CLI command implementations
//!
//! Every command loads the configuration once, builds the components it
//! needs from it and exits. Data lives under `data_dir`:
//!
//! ```text
//! <data_dir>/collections/<collection>.jsonl
//! <data_dir>/checkpoints/<checkpoint_id>.json
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};

use crate::aggregate::{build_count, build_facets, execute_count, execute_facets};
use crate::checkpoint::{CheckpointId, CheckpointStore, FileCheckpointStore, LoadCheckpoint};
use crate::config::Config;
use crate::export::{ExportEngine, ExportFormat, ExportRequest, FileSink, WriterSink};
use crate::filter::{CompiledPredicate, FilterCompiler};
use crate::ingest::{
    load_repertoire_metadata, load_set_digests, parse_repertoire_metadata, unload as unload_repertoire,
    CheckpointedLoader, LoadJob, LoadSummary,
};
use crate::observability::{log_event_with_fields, Event, LogAlertSink};
use crate::schema::{AirrSchema, SchemaAdapter, REARRANGEMENT_ENTITY, REPERTOIRE_ENTITY};
use crate::store::{DocumentStore, JsonlStore};

use super::args::Command;
use super::errors::{CliError, CliErrorCode, CliResult};
use super::io::{read_request, write_error, write_response};
use super::request::{parse_manifest, AdcRequest};

/// Components shared by every command
struct Context {
    config: Config,
    schema: Arc<AirrSchema>,
    store: Arc<JsonlStore>,
}

impl Context {
    fn open(config_path: &Path) -> CliResult<Self> {
        let config = Config::load(config_path)?;
        log_event_with_fields(
            Event::ConfigLoaded,
            &[("path", &config_path.display().to_string()), ("data_dir", &config.data_dir)],
        );

        let schema = match &config.schema_path {
            Some(path) => AirrSchema::load(Path::new(path), REARRANGEMENT_ENTITY)?,
            None => AirrSchema::builtin_rearrangement()?,
        };
        log_event_with_fields(
            Event::SchemaLoaded,
            &[("entity", schema.entity()), ("fields", &schema.len().to_string())],
        );

        let store = JsonlStore::open(&config.collections_dir())?;
        Ok(Self {
            config,
            schema: Arc::new(schema),
            store: Arc::new(store),
        })
    }

    fn checkpoints(&self) -> CliResult<FileCheckpointStore> {
        Ok(FileCheckpointStore::open(&self.config.checkpoints_dir())?)
    }

    /// Compile the request's filters; no filters matches everything
    fn compile(&self, request: &AdcRequest) -> CliResult<Option<CompiledPredicate>> {
        let Some(filters) = &request.filters else {
            return Ok(None);
        };
        let compiler = FilterCompiler::new(self.schema.as_ref(), self.config.compiler_options());
        match compiler.compile(filters) {
            Ok(predicate) => {
                log_event_with_fields(Event::QueryCompiled, &[("predicate", predicate.as_str())]);
                Ok(Some(predicate))
            }
            Err(err) => {
                log_event_with_fields(
                    Event::QueryRejected,
                    &[
                        ("code", err.code().code()),
                        ("field", err.field().unwrap_or("")),
                        ("message", err.message()),
                    ],
                );
                Err(err.into())
            }
        }
    }
}

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    match run_command(cli.command) {
        Ok(()) => Ok(()),
        // stdout already holds partial records; the caller reports on stderr
        Err(err) if err.is_after_output() => Err(err),
        Err(err) => {
            let _ = write_error(err.code_str(), err.message());
            Err(err)
        }
    }
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Compile { config } => compile(&config),
        Command::Count { config } => count(&config),
        Command::Facets { config, field } => facets(&config, field),
        Command::Export {
            config,
            format,
            out,
            repertoires,
        } => export(&config, format, out, repertoires),
        Command::LoadRepertoires { config, file } => load_repertoires(&config, &file),
        Command::Load {
            config,
            repertoire_id,
            data_processing_id,
            checkpoint_id,
            manifest,
            files,
        } => load(
            &config,
            repertoire_id,
            data_processing_id,
            checkpoint_id,
            manifest,
            files,
        ),
        Command::Unload {
            config,
            repertoire_id,
            from_load_set,
        } => unload(&config, &repertoire_id, from_load_set),
        Command::Status {
            config,
            checkpoint,
            verify,
        } => status(&config, checkpoint, verify),
    }
}

/// Print the compiled predicate of the request on stdin
pub fn compile(config_path: &Path) -> CliResult<()> {
    let ctx = Context::open(config_path)?;
    let request = AdcRequest::from_value(read_request()?)?;
    let predicate = ctx
        .compile(&request)?
        .map(CompiledPredicate::into_document)
        .unwrap_or_else(|| json!({}));
    write_response(json!({ "predicate": predicate }))
}

/// Count matching records
pub fn count(config_path: &Path) -> CliResult<()> {
    let ctx = Context::open(config_path)?;
    let request = AdcRequest::from_value(read_request()?)?;
    let predicate = ctx.compile(&request)?;

    let pipeline = build_count(predicate.as_ref(), request.from);
    let total = execute_count(ctx.store.as_ref(), &ctx.config.query_collection, &pipeline)?;
    write_response(json!({ "total_records": total }))
}

/// Facet counts of one field
pub fn facets(config_path: &Path, field: Option<String>) -> CliResult<()> {
    let ctx = Context::open(config_path)?;
    let request = AdcRequest::from_value(read_request()?)?;
    let field = field
        .or_else(|| request.facets.clone())
        .ok_or_else(|| CliError::invalid_request("No facet field given"))?;
    let predicate = ctx.compile(&request)?;

    let pipeline = build_facets(predicate.as_ref(), &field);
    let entries = execute_facets(ctx.store.as_ref(), &ctx.config.query_collection, &pipeline, &field)?;
    let facets: Vec<Value> = entries.iter().map(|e| e.to_value(&field)).collect();
    write_response(json!({ "Facet": facets }))
}

/// Stream matching records to stdout or a file
pub fn export(
    config_path: &Path,
    format: Option<String>,
    out: Option<PathBuf>,
    repertoires: bool,
) -> CliResult<()> {
    let ctx = Context::open(config_path)?;
    let request = AdcRequest::from_value(read_request()?)?;
    let predicate = ctx.compile(&request)?;

    let format_name = format.or_else(|| request.format.clone());
    let format = match format_name.as_deref() {
        None => ExportFormat::default(),
        Some(name) => ExportFormat::parse(name)
            .ok_or_else(|| CliError::invalid_request(format!("Unknown format '{}'", name)))?,
    };

    let export_config = ctx.config.export_config();
    let (collection, entity) = if repertoires {
        (ctx.config.repertoire_collection.clone(), REPERTOIRE_ENTITY)
    } else {
        (ctx.config.query_collection.clone(), ctx.schema.entity())
    };
    let mut export = ExportRequest::new(collection, entity)
        .format(format)
        .from(request.skip())
        .info(export_config.info);
    if let Some(predicate) = predicate {
        export = export.predicate(predicate);
    }
    if let Some(size) = request.size {
        export = export.size(size as usize);
    }
    if let Some(fields) = request.fields.clone() {
        export = export.projection(fields);
    }
    if let Some(profile) = &request.include_fields {
        export = export.include_profile(ctx.schema.as_ref(), profile);
    }
    if let Some(timeout) = export_config.timeout {
        export = export.deadline(Instant::now() + timeout);
    }

    let engine = ExportEngine::new(ctx.store.as_ref(), ctx.schema.as_ref());
    match out {
        Some(path) => {
            let mut sink = FileSink::create(&path)?;
            engine.stream(&export, &mut sink)?;
        }
        None => {
            let stdout = io::stdout();
            stream_to_writer(&engine, &export, stdout.lock())?;
        }
    }
    Ok(())
}

/// Stream an export into a writer shared with the response channel.
///
/// A failed stream may already have written records, so its error is
/// marked as raised after output.
fn stream_to_writer<W: Write>(engine: &ExportEngine<'_>, export: &ExportRequest, writer: W) -> CliResult<()> {
    let mut sink = WriterSink::new(writer);
    engine
        .stream(export, &mut sink)
        .map(|_| ())
        .map_err(|e| CliError::from(e).after_output())
}

/// Load one job from flags, or every job of a manifest concurrently
pub fn load(
    config_path: &Path,
    repertoire_id: Option<String>,
    data_processing_id: Option<String>,
    checkpoint_id: Option<String>,
    manifest: Option<PathBuf>,
    files: Vec<PathBuf>,
) -> CliResult<()> {
    let ctx = Context::open(config_path)?;
    let collection = ctx.config.load_collection.clone();

    let jobs = match manifest {
        Some(path) => {
            let text = fs::read_to_string(&path)?;
            parse_manifest(&text)?
                .into_iter()
                .map(|job| {
                    build_job(
                        &collection,
                        job.repertoire_id,
                        job.data_processing_id,
                        job.checkpoint_id,
                        job.files,
                    )
                })
                .collect::<CliResult<Vec<_>>>()?
        }
        None => {
            let repertoire_id = repertoire_id
                .ok_or_else(|| CliError::invalid_request("--repertoire-id is required"))?;
            vec![build_job(
                &collection,
                repertoire_id,
                data_processing_id,
                checkpoint_id,
                files,
            )?]
        }
    };

    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(ctx.checkpoints()?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let outcomes = runtime.block_on(run_jobs(&ctx, checkpoints, jobs));

    let mut failed = 0usize;
    let mut results = Vec::with_capacity(outcomes.len());
    for (repertoire_id, outcome) in outcomes {
        match outcome {
            Ok(summary) => results.push(json!({
                "repertoire_id": repertoire_id,
                "status": "ok",
                "summary": summary_json(&summary),
            })),
            Err(err) => {
                failed += 1;
                results.push(json!({
                    "repertoire_id": repertoire_id,
                    "status": "error",
                    "code": err.code_str(),
                    "message": err.message(),
                }));
            }
        }
    }

    if failed > 0 {
        return Err(CliError::new(
            CliErrorCode::LoadFailed,
            format!("{} of {} load jobs failed: {}", failed, results.len(), Value::Array(results)),
        ));
    }
    write_response(json!({ "jobs": results }))
}

fn build_job(
    collection: &str,
    repertoire_id: String,
    data_processing_id: Option<String>,
    checkpoint_id: Option<String>,
    files: Vec<PathBuf>,
) -> CliResult<LoadJob> {
    if files.is_empty() {
        return Err(CliError::invalid_request(format!(
            "No files given for repertoire {}",
            repertoire_id
        )));
    }
    let mut job = LoadJob::new(repertoire_id, collection, files);
    if let Some(dp_id) = data_processing_id {
        job = job.with_data_processing_id(dp_id);
    }
    if let Some(id) = checkpoint_id {
        job = job.with_checkpoint_id(CheckpointId::new(id)?);
    }
    Ok(job)
}

/// One blocking task per job; jobs share only the stores
async fn run_jobs(
    ctx: &Context,
    checkpoints: Arc<dyn CheckpointStore>,
    jobs: Vec<LoadJob>,
) -> Vec<(String, CliResult<LoadSummary>)> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::SeqCst);
        }
    });

    let store: Arc<dyn DocumentStore> = ctx.store.clone();
    let schema: Arc<dyn SchemaAdapter> = ctx.schema.clone();
    let mut handles = Vec::with_capacity(jobs.len());
    for job in jobs {
        let loader = CheckpointedLoader::new(
            store.clone(),
            checkpoints.clone(),
            schema.clone(),
            Arc::new(LogAlertSink),
            ctx.config.loader_config(),
        )
        .with_cancellation(cancel.clone());
        let repertoire_id = job.repertoire_id().to_string();
        handles.push((
            repertoire_id,
            tokio::task::spawn_blocking(move || loader.load(&job)),
        ));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (repertoire_id, handle) in handles {
        let outcome = match handle.await {
            Ok(result) => result.map_err(CliError::from),
            Err(join_error) => Err(CliError::new(
                CliErrorCode::LoadFailed,
                format!("Load task failed: {}", join_error),
            )),
        };
        outcomes.push((repertoire_id, outcome));
    }
    outcomes
}

fn summary_json(summary: &LoadSummary) -> Value {
    json!({
        "inserted": summary.inserted,
        "skipped_sets": summary.skipped_sets,
        "next_load_set": summary.next_load_set,
        "files": summary.files,
        "already_loaded": summary.already_loaded,
    })
}

/// Replace repertoire metadata from an AIRR JSON file
pub fn load_repertoires(config_path: &Path, file: &Path) -> CliResult<()> {
    let ctx = Context::open(config_path)?;
    let body: Value = serde_json::from_str(&fs::read_to_string(file)?)?;
    let repertoires = parse_repertoire_metadata(body)?;
    let summary = load_repertoire_metadata(
        ctx.store.as_ref(),
        &ctx.config.repertoire_collection,
        repertoires,
    )?;
    write_response(json!({
        "collection": ctx.config.repertoire_collection,
        "loaded": summary.loaded,
        "replaced": summary.replaced,
    }))
}

/// Remove a repertoire's records
pub fn unload(config_path: &Path, repertoire_id: &str, from_load_set: Option<u64>) -> CliResult<()> {
    let ctx = Context::open(config_path)?;
    let removed = unload_repertoire(
        ctx.store.as_ref(),
        &ctx.config.load_collection,
        repertoire_id,
        from_load_set,
    )?;
    write_response(json!({ "repertoire_id": repertoire_id, "removed": removed }))
}

/// Show checkpoints, optionally with per load set digests
pub fn status(config_path: &Path, checkpoint: Option<String>, verify: bool) -> CliResult<()> {
    let ctx = Context::open(config_path)?;
    let checkpoints = ctx.checkpoints()?;

    let records = match checkpoint {
        Some(id) => vec![checkpoints.get(&CheckpointId::new(id)?)?],
        None => checkpoints.list()?,
    };

    let mut entries = Vec::with_capacity(records.len());
    for record in &records {
        let mut entry = match serde_json::to_value(record)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if verify {
            entry.extend(verify_checkpoint(ctx.store.as_ref(), record)?);
        }
        entries.push(Value::Object(entry));
    }
    write_response(json!({ "checkpoints": entries }))
}

/// Digests of a checkpoint's load sets, and whether the store holds
/// records beyond its committed load set
fn verify_checkpoint(store: &dyn DocumentStore, checkpoint: &LoadCheckpoint) -> CliResult<Map<String, Value>> {
    let digests = load_set_digests(store, &checkpoint.target_collection, &checkpoint.repertoire_id)?;
    let consistent = digests.keys().all(|load_set| *load_set < checkpoint.load_set);

    let mut sets = Map::new();
    let mut total = 0u64;
    for (load_set, digest) in &digests {
        total += digest.count;
        sets.insert(
            load_set.to_string(),
            json!({ "count": digest.count, "sha256": digest.sha256 }),
        );
    }

    let mut result = Map::new();
    result.insert("records".into(), json!(total));
    result.insert("load_sets".into(), Value::Object(sets));
    result.insert("consistent".into(), Value::Bool(consistent));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_failed_stream_is_after_output() {
        let store = MemoryStore::new();
        store
            .insert_many("rearrangement", vec![json!({"sequence_id": "s1"})])
            .unwrap();
        let schema = AirrSchema::builtin_rearrangement().unwrap();
        let engine = ExportEngine::new(&store, &schema);

        let ok = ExportRequest::new("rearrangement", REARRANGEMENT_ENTITY);
        assert!(stream_to_writer(&engine, &ok, Vec::new()).is_ok());

        let expired = ExportRequest::new("rearrangement", REARRANGEMENT_ENTITY).deadline(Instant::now());
        let err = stream_to_writer(&engine, &expired, Vec::new()).unwrap_err();
        assert_eq!(err.code(), CliErrorCode::ExportFailed);
        assert!(err.is_after_output());
    }

    #[test]
    fn test_request_errors_are_not_after_output() {
        assert!(!CliError::invalid_request("bad").is_after_output());
    }
}
