//! Crash point injection for loader durability runs
//!
//! When `AIRRDB_CRASH_POINT` names a point, the process terminates via
//! `std::process::abort()` on reaching it: no cleanup, no unwinding.
//! Restarting the same load job must then converge on the same record set.
//!
//! # Usage
//!
//! ```bash
//! AIRRDB_CRASH_POINT=loader_after_insert airrdb load --repertoire-id r1 rows.tsv.gz
//! airrdb load --repertoire-id r1 rows.tsv.gz
//! ```

use std::sync::OnceLock;

/// Environment variable naming the active crash point
pub const CRASH_POINT_ENV: &str = "AIRRDB_CRASH_POINT";

static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn get_crash_point() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var(CRASH_POINT_ENV).ok())
        .as_deref()
}

/// Returns true if `AIRRDB_CRASH_POINT` equals the given name
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    get_crash_point().map(|p| p == name).unwrap_or(false)
}

/// Abort the process if the named crash point is enabled
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

/// All defined crash point names
pub mod points {
    /// Batch inserted, checkpoint not yet advanced
    pub const LOADER_AFTER_INSERT: &str = "loader_after_insert";
    /// Checkpoint advanced past the batch
    pub const LOADER_AFTER_CHECKPOINT: &str = "loader_after_checkpoint";
    /// Rollback delete done, no file opened yet
    pub const LOADER_AFTER_ROLLBACK: &str = "loader_after_rollback";

    /// Get all crash point names
    pub fn all() -> &'static [&'static str] {
        &[LOADER_AFTER_INSERT, LOADER_AFTER_CHECKPOINT, LOADER_AFTER_ROLLBACK]
    }
}
