//! CLI argument definitions using clap
//!
//! Commands:
//! - airrdb compile --config <path>            (ADC request on stdin)
//! - airrdb count --config <path>              (ADC request on stdin)
//! - airrdb facets --config <path> [--field f] (ADC request on stdin)
//! - airrdb export --config <path> [--format json|tsv] [--out file] [--repertoires]
//! - airrdb load --config <path> --repertoire-id <id> <files...>
//! - airrdb load --config <path> --manifest <jobs.json>
//! - airrdb load-repertoires --config <path> <metadata.json>
//! - airrdb unload --config <path> --repertoire-id <id> [--from-load-set n]
//! - airrdb status --config <path> [--checkpoint id] [--verify]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// airrdb - AIRR data repository core
#[derive(Parser, Debug)]
#[command(name = "airrdb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile the request's filters and print the predicate
    Compile {
        /// Path to configuration file
        #[arg(long, default_value = "./airrdb.json")]
        config: PathBuf,
    },

    /// Count records matching the request's filters
    Count {
        /// Path to configuration file
        #[arg(long, default_value = "./airrdb.json")]
        config: PathBuf,
    },

    /// Per-value counts of one field over the matching records
    Facets {
        /// Path to configuration file
        #[arg(long, default_value = "./airrdb.json")]
        config: PathBuf,

        /// Facet field; overrides the request's `facets`
        #[arg(long)]
        field: Option<String>,
    },

    /// Stream matching records as JSON or TSV
    Export {
        /// Path to configuration file
        #[arg(long, default_value = "./airrdb.json")]
        config: PathBuf,

        /// Output format; overrides the request's `format`
        #[arg(long)]
        format: Option<String>,

        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,

        /// Export repertoire metadata instead of rearrangements
        #[arg(long)]
        repertoires: bool,
    },

    /// Load TSV files (plain or gzip) for one or more repertoires
    Load {
        /// Path to configuration file
        #[arg(long, default_value = "./airrdb.json")]
        config: PathBuf,

        /// Repertoire the files belong to
        #[arg(long, required_unless_present = "manifest", conflicts_with = "manifest")]
        repertoire_id: Option<String>,

        /// Data processing id stamped on rows lacking one
        #[arg(long)]
        data_processing_id: Option<String>,

        /// Checkpoint id; derived from collection and repertoire when omitted
        #[arg(long)]
        checkpoint_id: Option<String>,

        /// JSON array of jobs, run concurrently
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Source files, loaded in the given order
        files: Vec<PathBuf>,
    },

    /// Replace repertoire metadata documents from an AIRR JSON file
    LoadRepertoires {
        /// Path to configuration file
        #[arg(long, default_value = "./airrdb.json")]
        config: PathBuf,

        /// Bare array or `{"Repertoire": [...]}`
        file: PathBuf,
    },

    /// Remove a repertoire's records
    Unload {
        /// Path to configuration file
        #[arg(long, default_value = "./airrdb.json")]
        config: PathBuf,

        #[arg(long)]
        repertoire_id: String,

        /// Only remove load sets from this index onward
        #[arg(long)]
        from_load_set: Option<u64>,
    },

    /// Show load checkpoints
    Status {
        /// Path to configuration file
        #[arg(long, default_value = "./airrdb.json")]
        config: PathBuf,

        /// Show a single checkpoint
        #[arg(long)]
        checkpoint: Option<String>,

        /// Add per load set record counts and digests
        #[arg(long)]
        verify: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
