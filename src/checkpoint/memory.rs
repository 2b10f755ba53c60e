//! In-memory checkpoint store

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use super::errors::{CheckpointStoreError, CheckpointStoreResult};
use super::record::{CheckpointId, CheckpointUpdate, JobDescriptor, LoadCheckpoint};
use super::CheckpointStore;

/// Checkpoint store that lives for the duration of the process
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    records: Mutex<HashMap<CheckpointId, LoadCheckpoint>>,
}

impl MemoryCheckpointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CheckpointStoreResult<std::sync::MutexGuard<'_, HashMap<CheckpointId, LoadCheckpoint>>> {
        self.records
            .lock()
            .map_err(|_| CheckpointStoreError::Io("checkpoint store lock poisoned".to_string()))
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn create(&self, job: &JobDescriptor) -> CheckpointStoreResult<CheckpointId> {
        let mut records = self.lock()?;
        let id = job.checkpoint_id.clone().unwrap_or_else(CheckpointId::generate);
        if records.contains_key(&id) {
            return Err(CheckpointStoreError::AlreadyExists(id.to_string()));
        }
        records.insert(id.clone(), LoadCheckpoint::new(id.clone(), job, Utc::now()));
        Ok(id)
    }

    fn update(&self, id: &CheckpointId, update: CheckpointUpdate) -> CheckpointStoreResult<()> {
        let mut records = self.lock()?;
        let checkpoint = records
            .get_mut(id)
            .ok_or_else(|| CheckpointStoreError::NotFound(id.to_string()))?;
        checkpoint.apply(&update, Utc::now());
        Ok(())
    }

    fn get(&self, id: &CheckpointId) -> CheckpointStoreResult<LoadCheckpoint> {
        self.lock()?
            .get(id)
            .cloned()
            .ok_or_else(|| CheckpointStoreError::NotFound(id.to_string()))
    }
}
