//! Export subsystem for airrdb
//!
//! Streams query results as a JSON envelope or as TSV, one record at a time.
//! The full result set is never held in memory.
//!
//! # Completion
//!
//! A successful export ends with `ExportSink::finish`. Any error (store,
//! sink or deadline) calls `ExportSink::abort` instead, so an incomplete
//! output is always distinguishable from an empty result.

mod engine;
mod errors;
mod json;
mod request;
mod sink;
mod tsv;

pub use engine::{ExportEngine, ExportSummary, INTERNAL_FIELDS};
pub use errors::{ExportError, ExportResult};
pub use request::{ExportFormat, ExportRequest};
pub use sink::{partial_path_for, ExportSink, FileSink, WriterSink};
pub use tsv::tsv_cell;
