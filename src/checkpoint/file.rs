//! File-backed checkpoint store
//!
//! Location: `<dir>/<checkpoint_id>.json`
//!
//! Every write goes to `<id>.json.tmp`, is fsynced, renamed over the
//! record, and the directory is fsynced. A reader therefore sees either the
//! previous record or the new one, never a mix.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;

use super::errors::{CheckpointStoreError, CheckpointStoreResult};
use super::record::{CheckpointId, CheckpointUpdate, JobDescriptor, LoadCheckpoint};
use super::CheckpointStore;

/// Checkpoint store keeping one JSON file per job
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCheckpointStore {
    /// Open (creating if needed) a checkpoint directory
    pub fn open(dir: &Path) -> CheckpointStoreResult<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            CheckpointStoreError::Io(format!(
                "Failed to create checkpoint directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Path of a checkpoint record
    pub fn record_path(&self, id: &CheckpointId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_str()))
    }

    /// All checkpoint records in the directory, sorted by id
    pub fn list(&self) -> CheckpointStoreResult<Vec<LoadCheckpoint>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(CheckpointId::new(stem)?);
            }
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids.iter().map(|id| self.get(id)).collect()
    }

    fn read(&self, id: &CheckpointId) -> CheckpointStoreResult<LoadCheckpoint> {
        let path = self.record_path(id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointStoreError::NotFound(id.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(CheckpointStoreError::Corrupt {
                    id: id.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let checkpoint: LoadCheckpoint =
            serde_json::from_str(&text).map_err(|e| CheckpointStoreError::Corrupt {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        if &checkpoint.checkpoint_id != id {
            return Err(CheckpointStoreError::Corrupt {
                id: id.to_string(),
                reason: format!("record carries id '{}'", checkpoint.checkpoint_id),
            });
        }
        Ok(checkpoint)
    }

    fn write(&self, checkpoint: &LoadCheckpoint) -> CheckpointStoreResult<()> {
        let path = self.record_path(&checkpoint.checkpoint_id);
        let temp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| CheckpointStoreError::Io(format!("Failed to serialize checkpoint: {}", e)))?;

        let mut file = File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &path)?;

        let dir = OpenOptions::new().read(true).open(&self.dir)?;
        dir.sync_all()?;
        Ok(())
    }

    fn lock(&self) -> CheckpointStoreResult<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| CheckpointStoreError::Io("checkpoint store lock poisoned".to_string()))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn create(&self, job: &JobDescriptor) -> CheckpointStoreResult<CheckpointId> {
        let _guard = self.lock()?;
        let id = job.checkpoint_id.clone().unwrap_or_else(CheckpointId::generate);
        if self.record_path(&id).exists() {
            return Err(CheckpointStoreError::AlreadyExists(id.to_string()));
        }
        self.write(&LoadCheckpoint::new(id.clone(), job, Utc::now()))?;
        Ok(id)
    }

    fn update(&self, id: &CheckpointId, update: CheckpointUpdate) -> CheckpointStoreResult<()> {
        let _guard = self.lock()?;
        let mut checkpoint = self.read(id)?;
        checkpoint.apply(&update, Utc::now());
        self.write(&checkpoint)
    }

    fn get(&self, id: &CheckpointId) -> CheckpointStoreResult<LoadCheckpoint> {
        self.read(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_get_update() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::open(dir.path()).unwrap();
        let id = store.create(&JobDescriptor::new("r1", "rearrangement")).unwrap();

        let checkpoint = store.get(&id).unwrap();
        assert_eq!(checkpoint.repertoire_id, "r1");
        assert_eq!(checkpoint.load_set, 0);

        store.update(&id, CheckpointUpdate::load_set(2)).unwrap();
        store.update(&id, CheckpointUpdate::loaded()).unwrap();
        let checkpoint = store.get(&id).unwrap();
        assert_eq!(checkpoint.load_set, 2);
        assert!(checkpoint.is_loaded);
        assert!(checkpoint.updated_at >= checkpoint.created_at);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let id = CheckpointId::new("rearrangement-r1").unwrap();
        {
            let store = FileCheckpointStore::open(dir.path()).unwrap();
            store
                .create(&JobDescriptor::new("r1", "rearrangement").with_id(id.clone()))
                .unwrap();
            store.update(&id, CheckpointUpdate::load_set(7)).unwrap();
        }
        let store = FileCheckpointStore::open(dir.path()).unwrap();
        assert_eq!(store.get(&id).unwrap().load_set, 7);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::open(dir.path()).unwrap();
        let job = JobDescriptor::new("r1", "rearrangement").with_id(CheckpointId::new("c1").unwrap());
        store.create(&job).unwrap();
        assert!(matches!(store.create(&job), Err(CheckpointStoreError::AlreadyExists(_))));
    }

    #[test]
    fn test_missing_and_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::open(dir.path()).unwrap();
        let id = CheckpointId::new("c1").unwrap();
        assert!(matches!(store.get(&id), Err(CheckpointStoreError::NotFound(_))));

        fs::write(store.record_path(&id), "{not json").unwrap();
        assert!(matches!(store.get(&id), Err(CheckpointStoreError::Corrupt { .. })));
        assert!(matches!(
            store.update(&id, CheckpointUpdate::load_set(1)),
            Err(CheckpointStoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::open(dir.path()).unwrap();
        store.create(&JobDescriptor::new("r1", "rearrangement")).unwrap();
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
