//! Checkpointed bulk loader
//!
//! Per job state machine:
//!
//! ```text
//! Created → Loading(load_set = N) → Loading(N + 1) → … → Loaded
//! ```
//!
//! # Restart protocol
//!
//! 1. Read the checkpoint. `is_loaded` → nothing to do.
//! 2. Delete every record of the repertoire with `load_set >= checkpoint`.
//!    The checkpoint only advances after an insert succeeds, so this removes
//!    the one batch a crash may have left uncommitted.
//! 3. Re-read the files in order, skipping load sets below the checkpoint.
//!
//! Only one batch is held in memory: the next batch is read after the
//! previous one is inserted and checkpointed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::checkpoint::{
    get_or_create, CheckpointId, CheckpointStore, CheckpointStoreError, CheckpointUpdate,
    JobDescriptor, LoadCheckpoint,
};
use crate::crash_point::{maybe_crash, points};
use crate::observability::{log_event_with_fields, AlertSink, Event};
use crate::schema::SchemaAdapter;
use crate::store::DocumentStore;

use super::errors::{LoaderError, LoaderErrorCode, LoaderResult};
use super::reader::RowReader;
use super::transform::{clean_object, transform, RepertoireContext, LOAD_SET_FIELD, REPERTOIRE_ID_FIELD};

/// Rows per load set unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Loader tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Rows per load set
    pub batch_size: usize,
    /// Extra attempts for a checkpoint update that failed transiently
    pub checkpoint_retries: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            checkpoint_retries: 1,
        }
    }
}

/// One repertoire load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadJob {
    pub context: RepertoireContext,
    pub collection: String,
    /// Source files, processed in this order
    pub files: Vec<PathBuf>,
    /// Explicit checkpoint id; derived from collection and repertoire otherwise
    pub checkpoint_id: Option<CheckpointId>,
}

impl LoadJob {
    pub fn new(repertoire_id: impl Into<String>, collection: impl Into<String>, files: Vec<PathBuf>) -> Self {
        Self {
            context: RepertoireContext::new(repertoire_id),
            collection: collection.into(),
            files,
            checkpoint_id: None,
        }
    }

    pub fn with_data_processing_id(mut self, id: impl Into<String>) -> Self {
        self.context = self.context.with_data_processing_id(id);
        self
    }

    pub fn with_checkpoint_id(mut self, id: CheckpointId) -> Self {
        self.checkpoint_id = Some(id);
        self
    }

    pub fn repertoire_id(&self) -> &str {
        &self.context.repertoire_id
    }

    /// Checkpoint descriptor for this job
    pub fn descriptor(&self) -> LoaderResult<JobDescriptor> {
        let id = match &self.checkpoint_id {
            Some(id) => id.clone(),
            None => CheckpointId::for_job(&self.collection, self.repertoire_id())
                .map_err(|e| LoaderError::checkpoint("Cannot derive checkpoint id", e))?,
        };
        Ok(JobDescriptor::new(self.repertoire_id(), self.collection.clone()).with_id(id))
    }
}

/// Outcome of a load run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Records inserted by this run
    pub inserted: u64,
    /// Load sets skipped because an earlier run committed them
    pub skipped_sets: u64,
    /// Checkpoint value after this run
    pub next_load_set: u64,
    /// Files read by this run
    pub files: usize,
    /// The checkpoint already marked the job loaded
    pub already_loaded: bool,
}

/// Streams source files into a document store, one checkpointed batch at a time
pub struct CheckpointedLoader {
    store: Arc<dyn DocumentStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    schema: Arc<dyn SchemaAdapter>,
    alerts: Arc<dyn AlertSink>,
    config: LoaderConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl CheckpointedLoader {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        schema: Arc<dyn SchemaAdapter>,
        alerts: Arc<dyn AlertSink>,
        config: LoaderConfig,
    ) -> Self {
        Self {
            store,
            checkpoints,
            schema,
            alerts,
            config,
            cancel: None,
        }
    }

    /// Observe `flag` between batches; once set, the job stops before its next batch
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> LoaderConfig {
        self.config
    }

    /// Run a job to completion, or until it fails or is cancelled.
    ///
    /// Safe to call again after any failure: the run resumes from the last
    /// committed load set.
    pub fn load(&self, job: &LoadJob) -> LoaderResult<LoadSummary> {
        log_event_with_fields(
            Event::LoadStart,
            &[
                ("repertoire_id", job.repertoire_id()),
                ("collection", &job.collection),
                ("files", &job.files.len().to_string()),
            ],
        );

        match self.run(job) {
            Ok(summary) => Ok(summary),
            Err(err) if err.code() == LoaderErrorCode::AdcLoadCancelled => {
                log_event_with_fields(
                    Event::LoadCancelled,
                    &[("repertoire_id", job.repertoire_id()), ("message", err.message())],
                );
                Err(err)
            }
            Err(err) => {
                let rendered = err.to_string();
                log_event_with_fields(
                    Event::LoadFailed,
                    &[
                        ("repertoire_id", job.repertoire_id()),
                        ("code", err.code().code()),
                        ("severity", &err.severity().to_string()),
                        ("error", &rendered),
                    ],
                );
                self.alerts.alert(
                    &format!("load {}/{}", job.collection, job.repertoire_id()),
                    &rendered,
                );
                Err(err)
            }
        }
    }

    fn run(&self, job: &LoadJob) -> LoaderResult<LoadSummary> {
        let descriptor = job.descriptor()?;
        let checkpoint = get_or_create(self.checkpoints.as_ref(), &descriptor)
            .map_err(|e| checkpoint_failure("Cannot read load checkpoint", e))?;
        let checkpoint_id = checkpoint.checkpoint_id.clone();

        if checkpoint.is_loaded {
            log_event_with_fields(
                Event::LoadAlreadyComplete,
                &[
                    ("repertoire_id", job.repertoire_id()),
                    ("checkpoint_id", checkpoint_id.as_str()),
                    ("load_set", &checkpoint.load_set.to_string()),
                ],
            );
            return Ok(LoadSummary {
                next_load_set: checkpoint.load_set,
                already_loaded: true,
                ..LoadSummary::default()
            });
        }

        let start = checkpoint.load_set;
        self.rollback(job, &checkpoint)?;
        maybe_crash(points::LOADER_AFTER_ROLLBACK);

        let mut summary = LoadSummary::default();
        let mut load_set = 0u64;
        let batch_size = self.config.batch_size.max(1);

        for path in &job.files {
            let source = path.display().to_string();
            let mut reader = RowReader::open(path, self.schema.as_ref())?;
            log_event_with_fields(
                Event::LoadFileStart,
                &[("file", &source), ("load_set", &load_set.to_string())],
            );
            summary.files += 1;

            loop {
                self.check_cancelled(load_set)?;
                let Some(rows) = reader.next_batch(batch_size)? else {
                    break;
                };

                if load_set < start {
                    log_event_with_fields(
                        Event::LoadSetSkipped,
                        &[("file", &source), ("load_set", &load_set.to_string())],
                    );
                    summary.skipped_sets += 1;
                    load_set += 1;
                    continue;
                }

                let documents: Vec<Value> = rows
                    .into_iter()
                    .map(|row| {
                        let mut record = transform(row, &job.context, load_set);
                        clean_object(&mut record);
                        Value::Object(record)
                    })
                    .collect();

                let inserted = self
                    .store
                    .insert_many(&job.collection, documents)
                    .map_err(|e| LoaderError::store(format!("Insert of load set {} failed", load_set), e))?;
                maybe_crash(points::LOADER_AFTER_INSERT);

                self.advance(&checkpoint_id, CheckpointUpdate::load_set(load_set + 1))?;
                maybe_crash(points::LOADER_AFTER_CHECKPOINT);

                log_event_with_fields(
                    Event::LoadSetInserted,
                    &[
                        ("file", &source),
                        ("load_set", &load_set.to_string()),
                        ("records", &inserted.to_string()),
                    ],
                );
                summary.inserted += inserted;
                load_set += 1;
            }

            log_event_with_fields(
                Event::LoadFileComplete,
                &[("file", &source), ("rows", &reader.rows_read().to_string())],
            );
        }

        self.advance(&checkpoint_id, CheckpointUpdate::loaded())?;
        summary.next_load_set = load_set.max(start);
        log_event_with_fields(
            Event::LoadComplete,
            &[
                ("repertoire_id", job.repertoire_id()),
                ("inserted", &summary.inserted.to_string()),
                ("skipped_sets", &summary.skipped_sets.to_string()),
                ("load_set", &summary.next_load_set.to_string()),
            ],
        );
        Ok(summary)
    }

    fn rollback(&self, job: &LoadJob, checkpoint: &LoadCheckpoint) -> LoaderResult<()> {
        let removed = unload_records(
            self.store.as_ref(),
            &job.collection,
            job.repertoire_id(),
            Some(checkpoint.load_set),
        )?;
        log_event_with_fields(
            Event::LoadRollback,
            &[
                ("repertoire_id", job.repertoire_id()),
                ("from_load_set", &checkpoint.load_set.to_string()),
                ("removed", &removed.to_string()),
            ],
        );
        Ok(())
    }

    /// Apply a checkpoint update, retrying transient failures
    fn advance(&self, id: &CheckpointId, update: CheckpointUpdate) -> LoaderResult<()> {
        let mut attempt = 0u32;
        loop {
            match self.checkpoints.update(id, update) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.config.checkpoint_retries => {
                    attempt += 1;
                    log_event_with_fields(
                        Event::CheckpointUpdateRetry,
                        &[
                            ("checkpoint_id", id.as_str()),
                            ("attempt", &attempt.to_string()),
                            ("error", &e.to_string()),
                        ],
                    );
                }
                Err(e) if e.is_retryable() => {
                    return Err(LoaderError::transient(
                        format!("Checkpoint {} update failed", id),
                        e,
                    )
                    .escalated())
                }
                Err(e) => {
                    return Err(LoaderError::checkpoint(
                        format!("Checkpoint {} update failed", id),
                        e,
                    ))
                }
            }
        }
    }

    fn check_cancelled(&self, next_load_set: u64) -> LoaderResult<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::SeqCst) => Err(LoaderError::cancelled(next_load_set)),
            _ => Ok(()),
        }
    }
}

fn checkpoint_failure(message: &str, err: CheckpointStoreError) -> LoaderError {
    if err.is_retryable() {
        LoaderError::transient(message, err)
    } else {
        LoaderError::checkpoint(message, err)
    }
}

fn unload_records(
    store: &dyn DocumentStore,
    collection: &str,
    repertoire_id: &str,
    from: Option<u64>,
) -> LoaderResult<u64> {
    let filter = match from {
        Some(load_set) => json!({
            REPERTOIRE_ID_FIELD: repertoire_id,
            LOAD_SET_FIELD: {"$gte": load_set},
        }),
        None => json!({ REPERTOIRE_ID_FIELD: repertoire_id }),
    };
    store
        .delete_many(collection, &filter)
        .map_err(|e| LoaderError::store(format!("Delete for repertoire {} failed", repertoire_id), e))
}

/// Delete a repertoire's records, optionally only from `from` onward.
///
/// Idempotent: deleting a range that holds no records returns 0.
pub fn unload(
    store: &dyn DocumentStore,
    collection: &str,
    repertoire_id: &str,
    from: Option<u64>,
) -> LoaderResult<u64> {
    let removed = unload_records(store, collection, repertoire_id, from)?;
    let from_text = from.map(|n| n.to_string()).unwrap_or_else(|| "all".to_string());
    log_event_with_fields(
        Event::UnloadComplete,
        &[
            ("collection", collection),
            ("repertoire_id", repertoire_id),
            ("from_load_set", &from_text),
            ("removed", &removed.to_string()),
        ],
    );
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::observability::RecordingAlertSink;
    use crate::schema::AirrSchema;
    use crate::store::{MemoryStore, StoreResult};
    use std::fs;
    use std::sync::atomic::AtomicU32;
    use tempfile::TempDir;

    const COLLECTION: &str = "rearrangement";

    /// Fails `update` calls whose ordinal is listed in `fail_on`
    struct FlakyCheckpoints {
        inner: MemoryCheckpointStore,
        calls: AtomicU32,
        fail_on: Vec<u32>,
        error: CheckpointStoreError,
    }

    impl FlakyCheckpoints {
        fn new(fail_on: Vec<u32>, error: CheckpointStoreError) -> Self {
            Self {
                inner: MemoryCheckpointStore::new(),
                calls: AtomicU32::new(0),
                fail_on,
                error,
            }
        }
    }

    impl CheckpointStore for FlakyCheckpoints {
        fn create(&self, job: &JobDescriptor) -> crate::checkpoint::CheckpointStoreResult<CheckpointId> {
            self.inner.create(job)
        }

        fn update(&self, id: &CheckpointId, update: CheckpointUpdate) -> crate::checkpoint::CheckpointStoreResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.contains(&call) {
                return Err(self.error.clone());
            }
            self.inner.update(id, update)
        }

        fn get(&self, id: &CheckpointId) -> crate::checkpoint::CheckpointStoreResult<LoadCheckpoint> {
            self.inner.get(id)
        }
    }

    fn write_tsv(dir: &TempDir, name: &str, rows: usize) -> PathBuf {
        let mut text = String::from("sequence_id\tv_call\tjunction_aa\tduplicate_count\n");
        for i in 0..rows {
            text.push_str(&format!("{}-{}\tTRBV20-1*01\tCASSLG{}\t{}\n", name, i, i, i));
        }
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    fn loader(store: Arc<MemoryStore>, checkpoints: Arc<dyn CheckpointStore>, alerts: Arc<RecordingAlertSink>) -> CheckpointedLoader {
        let schema = Arc::new(AirrSchema::builtin_rearrangement().unwrap());
        CheckpointedLoader::new(
            store,
            checkpoints,
            schema,
            alerts,
            LoaderConfig { batch_size: 2, checkpoint_retries: 1 },
        )
    }

    fn docs(store: &MemoryStore) -> StoreResult<Vec<Value>> {
        store.documents(COLLECTION)
    }

    #[test]
    fn test_load_two_files() {
        let dir = TempDir::new().unwrap();
        let files = vec![write_tsv(&dir, "a.tsv", 3), write_tsv(&dir, "b.tsv", 2)];
        let store = Arc::new(MemoryStore::new());
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let alerts = Arc::new(RecordingAlertSink::new());
        let loader = loader(store.clone(), checkpoints.clone(), alerts.clone());

        let job = LoadJob::new("rep-1", COLLECTION, files).with_data_processing_id("dp-1");
        let summary = loader.load(&job).unwrap();
        assert_eq!(summary.inserted, 5);
        // a.tsv: sets 0 and 1 (partial), b.tsv: set 2
        assert_eq!(summary.next_load_set, 3);
        assert_eq!(summary.files, 2);

        let records = docs(&store).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0]["repertoire_id"], "rep-1");
        assert_eq!(records[0]["data_processing_id"], "dp-1");
        assert_eq!(records[0]["v_gene"], "TRBV20-1");
        assert_eq!(records[2]["load_set"], 1);
        assert_eq!(records[4]["load_set"], 2);

        let checkpoint = checkpoints.get(&job.descriptor().unwrap().checkpoint_id.unwrap()).unwrap();
        assert!(checkpoint.is_loaded);
        assert_eq!(checkpoint.load_set, 3);
        assert!(alerts.alerts().is_empty());
    }

    #[test]
    fn test_loaded_job_short_circuits() {
        let dir = TempDir::new().unwrap();
        let files = vec![write_tsv(&dir, "a.tsv", 3)];
        let store = Arc::new(MemoryStore::new());
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let loader = loader(store.clone(), checkpoints, Arc::new(RecordingAlertSink::new()));
        let job = LoadJob::new("rep-1", COLLECTION, files);

        loader.load(&job).unwrap();
        let again = loader.load(&job).unwrap();
        assert!(again.already_loaded);
        assert_eq!(again.inserted, 0);
        assert_eq!(docs(&store).unwrap().len(), 3);
    }

    #[test]
    fn test_single_retry_recovers() {
        let dir = TempDir::new().unwrap();
        let files = vec![write_tsv(&dir, "a.tsv", 4)];
        let store = Arc::new(MemoryStore::new());
        let checkpoints = Arc::new(FlakyCheckpoints::new(
            vec![0],
            CheckpointStoreError::Transient("timeout".into()),
        ));
        let loader = loader(store.clone(), checkpoints, Arc::new(RecordingAlertSink::new()));

        let summary = loader.load(&LoadJob::new("rep-1", COLLECTION, files)).unwrap();
        assert_eq!(summary.inserted, 4);
    }

    #[test]
    fn test_exhausted_retry_is_fatal_and_resumable() {
        let dir = TempDir::new().unwrap();
        let files = vec![write_tsv(&dir, "a.tsv", 6)];
        let store = Arc::new(MemoryStore::new());
        // set 0 commits, both attempts for set 1 fail
        let checkpoints = Arc::new(FlakyCheckpoints::new(
            vec![1, 2],
            CheckpointStoreError::Transient("timeout".into()),
        ));
        let alerts = Arc::new(RecordingAlertSink::new());
        let loader = loader(store.clone(), checkpoints.clone(), alerts.clone());
        let job = LoadJob::new("rep-1", COLLECTION, files);

        let err = loader.load(&job).unwrap_err();
        assert_eq!(err.code(), LoaderErrorCode::AdcTransientStoreError);
        assert!(err.is_fatal());
        assert_eq!(alerts.alerts().len(), 1);
        // set 1 was inserted but never checkpointed
        assert_eq!(docs(&store).unwrap().len(), 4);

        let summary = loader.load(&job).unwrap();
        assert_eq!(summary.skipped_sets, 1);
        assert_eq!(summary.inserted, 4);

        let records = docs(&store).unwrap();
        assert_eq!(records.len(), 6);
        let mut ids: Vec<_> = records.iter().map(|r| r["sequence_id"].as_str().unwrap().to_string()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn test_corrupt_checkpoint_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let files = vec![write_tsv(&dir, "a.tsv", 2)];
        let store = Arc::new(MemoryStore::new());
        let checkpoints = Arc::new(FlakyCheckpoints::new(
            vec![0],
            CheckpointStoreError::Corrupt { id: "c".into(), reason: "bad json".into() },
        ));
        let loader = loader(store, checkpoints, Arc::new(RecordingAlertSink::new()));

        let err = loader.load(&LoadJob::new("rep-1", COLLECTION, files)).unwrap_err();
        assert_eq!(err.code(), LoaderErrorCode::AdcCheckpointCorrupt);
    }

    #[test]
    fn test_missing_file_is_stream_error() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let alerts = Arc::new(RecordingAlertSink::new());
        let loader = loader(store, Arc::new(MemoryCheckpointStore::new()), alerts.clone());

        let job = LoadJob::new("rep-1", COLLECTION, vec![dir.path().join("missing.tsv")]);
        let err = loader.load(&job).unwrap_err();
        assert_eq!(err.code(), LoaderErrorCode::AdcSourceStreamError);
        assert_eq!(alerts.alerts().len(), 1);
    }

    #[test]
    fn test_cancellation_between_batches() {
        let dir = TempDir::new().unwrap();
        let files = vec![write_tsv(&dir, "a.tsv", 4)];
        let store = Arc::new(MemoryStore::new());
        let flag = Arc::new(AtomicBool::new(true));
        let alerts = Arc::new(RecordingAlertSink::new());
        let loader = loader(store.clone(), Arc::new(MemoryCheckpointStore::new()), alerts.clone())
            .with_cancellation(flag.clone());
        let job = LoadJob::new("rep-1", COLLECTION, files);

        let err = loader.load(&job).unwrap_err();
        assert_eq!(err.code(), LoaderErrorCode::AdcLoadCancelled);
        assert!(!err.is_fatal());
        assert!(alerts.alerts().is_empty());
        assert!(docs(&store).unwrap().is_empty());

        flag.store(false, Ordering::SeqCst);
        assert_eq!(loader.load(&job).unwrap().inserted, 4);
    }

    #[test]
    fn test_unload_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let files = vec![write_tsv(&dir, "a.tsv", 5)];
        let store = Arc::new(MemoryStore::new());
        let loader = loader(store.clone(), Arc::new(MemoryCheckpointStore::new()), Arc::new(RecordingAlertSink::new()));
        loader.load(&LoadJob::new("rep-1", COLLECTION, files)).unwrap();

        assert_eq!(unload(store.as_ref(), COLLECTION, "rep-1", Some(1)).unwrap(), 3);
        assert_eq!(unload(store.as_ref(), COLLECTION, "rep-1", Some(1)).unwrap(), 0);
        assert_eq!(unload(store.as_ref(), COLLECTION, "rep-1", None).unwrap(), 2);
        assert_eq!(unload(store.as_ref(), COLLECTION, "rep-1", None).unwrap(), 0);
        assert_eq!(store.count(COLLECTION, &json!({})).unwrap(), 0);
    }
}
