//! Load checkpoint record
//!
//! One record per repertoire-load job:
//!
//! ```json
//! {
//!   "checkpoint_id": "rearrangement-5f3c...e1",
//!   "repertoire_id": "r1",
//!   "target_collection": "rearrangement",
//!   "load_set": 3,
//!   "is_loaded": false,
//!   "created_at": "2026-01-05T10:00:00Z",
//!   "updated_at": "2026-01-05T10:04:12Z"
//! }
//! ```
//!
//! `load_set` is the first batch not yet committed. `is_loaded` flips to
//! true only after the final batch of the final file commits.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::errors::{CheckpointStoreError, CheckpointStoreResult};

/// Identifier of a checkpoint record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(String);

impl CheckpointId {
    /// Validate and wrap an id. Ids are used as file names.
    pub fn new(id: impl Into<String>) -> CheckpointStoreResult<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !id.starts_with('.');
        if valid {
            Ok(Self(id))
        } else {
            Err(CheckpointStoreError::InvalidId(id))
        }
    }

    /// Fresh random id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Stable id for a repertoire load into a collection.
    ///
    /// The repertoire id is hashed, so distinct repertoires never share an
    /// id whatever characters they contain.
    pub fn for_job(collection: &str, repertoire_id: &str) -> CheckpointStoreResult<Self> {
        let digest = Sha256::digest(repertoire_id.as_bytes());
        Self::new(format!("{}-{:x}", collection, digest))
    }

    /// Returns the id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a new checkpoint is created for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    /// Requested id; a random one is generated when absent
    pub checkpoint_id: Option<CheckpointId>,
    pub repertoire_id: String,
    pub target_collection: String,
}

impl JobDescriptor {
    /// Create a descriptor with a generated id
    pub fn new(repertoire_id: impl Into<String>, target_collection: impl Into<String>) -> Self {
        Self {
            checkpoint_id: None,
            repertoire_id: repertoire_id.into(),
            target_collection: target_collection.into(),
        }
    }

    /// Use a specific checkpoint id
    pub fn with_id(mut self, id: CheckpointId) -> Self {
        self.checkpoint_id = Some(id);
        self
    }
}

/// Persistent progress of one load job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadCheckpoint {
    pub checkpoint_id: CheckpointId,
    pub repertoire_id: String,
    pub target_collection: String,
    pub load_set: u64,
    pub is_loaded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoadCheckpoint {
    /// Fresh checkpoint at load set 0
    pub fn new(checkpoint_id: CheckpointId, job: &JobDescriptor, now: DateTime<Utc>) -> Self {
        Self {
            checkpoint_id,
            repertoire_id: job.repertoire_id.clone(),
            target_collection: job.target_collection.clone(),
            load_set: 0,
            is_loaded: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// True if this record tracks `job`'s repertoire and collection
    pub fn belongs_to(&self, job: &JobDescriptor) -> bool {
        self.repertoire_id == job.repertoire_id && self.target_collection == job.target_collection
    }

    /// Apply a partial update
    pub fn apply(&mut self, update: &CheckpointUpdate, now: DateTime<Utc>) {
        if let Some(load_set) = update.load_set {
            self.load_set = load_set;
        }
        if let Some(is_loaded) = update.is_loaded {
            self.is_loaded = is_loaded;
        }
        self.updated_at = now;
    }
}

/// Fields to change on a checkpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointUpdate {
    pub load_set: Option<u64>,
    pub is_loaded: Option<bool>,
}

impl CheckpointUpdate {
    /// Advance to the given load set
    pub fn load_set(load_set: u64) -> Self {
        Self {
            load_set: Some(load_set),
            is_loaded: None,
        }
    }

    /// Mark the job complete
    pub fn loaded() -> Self {
        Self {
            load_set: None,
            is_loaded: Some(true),
        }
    }
}
