//! Ingestion subsystem for airrdb
//!
//! Reads AIRR TSV files (plain or gzip), normalizes each row and bulk
//! inserts them one checkpointed load set at a time.
//!
//! # Pipeline
//!
//! ```text
//! file → RowReader (gunzip, TSV, typed cells)
//!      → transform + clean_object
//!      → DocumentStore::insert_many
//!      → CheckpointStore::update(load_set + 1)
//! ```
//!
//! Repertoire metadata documents load separately: each replaces the stored
//! document with the same `repertoire_id`.
//!
//! A failed or cancelled job leaves its last committed checkpoint intact;
//! running it again resumes from there without duplicating or losing rows.

mod digest;
mod errors;
mod loader;
mod reader;
mod repertoire;
mod transform;

pub use digest::{load_set_digests, LoadSetDigest};
pub use errors::{LoaderError, LoaderErrorCode, LoaderResult, Severity};
pub use loader::{unload, CheckpointedLoader, LoadJob, LoadSummary, LoaderConfig, DEFAULT_BATCH_SIZE};
pub use reader::{map_cell, Row, RowReader};
pub use repertoire::{load_repertoire_metadata, parse_repertoire_metadata, RepertoireLoadSummary};
pub use transform::{
    clean_object, junction_suffixes, parse_gene, transform, ParsedGene, RepertoireContext,
    DATA_PROCESSING_ID_FIELD, GENE_CALL_PREFIXES, LOAD_SET_FIELD, REPERTOIRE_ID_FIELD,
};
