//! CLI module for airrdb
//!
//! Provides command-line interface for:
//! - compile / count / facets: ADC queries read from stdin
//! - export: streaming JSON or TSV output
//! - load / unload: checkpointed repertoire ingestion and removal
//! - status: load checkpoints and per load set digests

mod args;
mod commands;
mod errors;
mod io;
mod request;

pub use args::{Cli, Command};
pub use commands::{compile, count, export, facets, load, run, run_command, status, unload};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_request, write_error, write_response};
pub use request::{parse_manifest, AdcRequest, ManifestJob};
