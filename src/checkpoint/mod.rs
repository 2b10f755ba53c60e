//! Checkpoint subsystem for airrdb
//!
//! A load checkpoint is the only coordination point between a load job and
//! its restarts, and between concurrent jobs. The loader treats the store as
//! at-least-once writable and does its own retrying.
//!
//! # Crash Safety
//!
//! - The checkpoint advances only after a batch insert succeeds
//! - Crash before the update → the batch is rolled back on restart
//! - Crash after the update → the batch is kept and skipped on restart
//!
//! Records are never deleted by the loader.

mod errors;
mod file;
mod memory;
mod record;

pub use errors::{CheckpointStoreError, CheckpointStoreResult};
pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;
pub use record::{CheckpointId, CheckpointUpdate, JobDescriptor, LoadCheckpoint};

/// Persistent load-progress records
pub trait CheckpointStore: Send + Sync {
    /// Create a checkpoint at load set 0, returning its id
    fn create(&self, job: &JobDescriptor) -> CheckpointStoreResult<CheckpointId>;

    /// Apply a partial update
    fn update(&self, id: &CheckpointId, update: CheckpointUpdate) -> CheckpointStoreResult<()>;

    /// Read a checkpoint
    fn get(&self, id: &CheckpointId) -> CheckpointStoreResult<LoadCheckpoint>;
}

/// Return the checkpoint for `job`'s id, creating it if it does not exist.
///
/// An existing record must track the same repertoire and collection as
/// `job`; otherwise `Mismatch`.
pub fn get_or_create(
    store: &dyn CheckpointStore,
    job: &JobDescriptor,
) -> CheckpointStoreResult<LoadCheckpoint> {
    if let Some(id) = &job.checkpoint_id {
        match store.get(id) {
            Ok(existing) if existing.belongs_to(job) => return Ok(existing),
            Ok(existing) => {
                return Err(CheckpointStoreError::Mismatch {
                    id: id.to_string(),
                    reason: format!(
                        "tracks repertoire '{}' in '{}', job is repertoire '{}' in '{}'",
                        existing.repertoire_id,
                        existing.target_collection,
                        job.repertoire_id,
                        job.target_collection
                    ),
                })
            }
            Err(CheckpointStoreError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }
    let id = store.create(job)?;
    store.get(&id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_resumes_existing() {
        let store = MemoryCheckpointStore::new();
        let job = JobDescriptor::new("r1", "rearrangement")
            .with_id(CheckpointId::for_job("rearrangement", "r1").unwrap());

        let first = get_or_create(&store, &job).unwrap();
        store
            .update(&first.checkpoint_id, CheckpointUpdate::load_set(5))
            .unwrap();

        let second = get_or_create(&store, &job).unwrap();
        assert_eq!(second.checkpoint_id, first.checkpoint_id);
        assert_eq!(second.load_set, 5);
    }

    #[test]
    fn test_get_or_create_rejects_foreign_record() {
        let store = MemoryCheckpointStore::new();
        let shared = CheckpointId::new("shared").unwrap();
        let first = JobDescriptor::new("rep.1", "rearrangement").with_id(shared.clone());
        get_or_create(&store, &first).unwrap();

        let second = JobDescriptor::new("rep/1", "rearrangement").with_id(shared);
        let err = get_or_create(&store, &second).unwrap_err();
        assert!(matches!(err, CheckpointStoreError::Mismatch { .. }));
    }
}
