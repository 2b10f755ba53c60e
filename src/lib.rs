//! airrdb - A strict, deterministic AIRR data repository core
//!
//! - `filter`: ADC filter expressions → document-store predicates
//! - `aggregate`: count and facet pipelines, facet folding
//! - `ingest`: checkpointed, resumable bulk loading of AIRR TSV files
//! - `export`: streaming JSON / TSV export with required-field backfill

pub mod aggregate;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod crash_point;
pub mod export;
pub mod filter;
pub mod ingest;
pub mod observability;
pub mod schema;
pub mod store;
