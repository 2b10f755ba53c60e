//! Configuration
//!
//! One JSON file, loaded and validated once at startup. Components never
//! read it directly: they receive the option struct derived for them.
//!
//! ```json
//! {
//!   "data_dir": "/var/lib/airrdb",
//!   "batch_size": 10000,
//!   "query_timeout_ms": 30000,
//!   "info": {"title": "AIRR Data Commons API"}
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::filter::CompilerOptions;
use crate::ingest::{LoaderConfig, DEFAULT_BATCH_SIZE};

/// Default config file location
pub const DEFAULT_CONFIG_PATH: &str = "./airrdb.json";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Data directory (required)
    pub data_dir: String,

    /// AIRR schema file; the bundled Rearrangement schema otherwise
    #[serde(default)]
    pub schema_path: Option<String>,

    /// Collection queried by compile/count/facets/export
    #[serde(default = "default_collection")]
    pub query_collection: String,

    /// Collection written by load/unload
    #[serde(default = "default_collection")]
    pub load_collection: String,

    /// Collection holding repertoire metadata documents
    #[serde(default = "default_repertoire_collection")]
    pub repertoire_collection: String,

    /// Rows per load set (must be > 0)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Extra attempts for a transiently failed checkpoint write
    #[serde(default = "default_checkpoint_retries")]
    pub checkpoint_retries: u32,

    /// Export deadline, measured from the start of the export
    #[serde(default)]
    pub query_timeout_ms: Option<u64>,

    #[serde(default)]
    pub disable_contains: bool,

    /// Reject filters on fields without query support
    #[serde(default)]
    pub check_query_support: bool,

    /// Placed in the export envelope's `Info`
    #[serde(default)]
    pub info: Option<Value>,
}

fn default_collection() -> String {
    "rearrangement".to_string()
}
fn default_repertoire_collection() -> String {
    "repertoire".to_string()
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_checkpoint_retries() -> u32 {
    1
}

/// Options for the export engine
#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    pub timeout: Option<Duration>,
    pub info: Value,
}

impl Config {
    /// Configuration rooted at `data_dir`, every other field defaulted
    pub fn with_data_dir(data_dir: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            schema_path: None,
            query_collection: default_collection(),
            load_collection: default_collection(),
            repertoire_collection: default_repertoire_collection(),
            batch_size: default_batch_size(),
            checkpoint_retries: default_checkpoint_retries(),
            query_timeout_ms: None,
            disable_contains: false,
            check_query_support: false,
            info: None,
        }
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Parse and validate configuration text
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".into()));
        }
        if self.query_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("query_timeout_ms must be > 0".into()));
        }
        for (key, name) in [
            ("query_collection", &self.query_collection),
            ("load_collection", &self.load_collection),
            ("repertoire_collection", &self.repertoire_collection),
        ] {
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(ConfigError::Invalid(format!("{} '{}' is not a valid collection name", key, name)));
            }
        }
        if let Some(info) = &self.info {
            if !info.is_object() {
                return Err(ConfigError::Invalid("info must be a JSON object".into()));
            }
        }
        Ok(())
    }

    pub fn data_path(&self) -> &Path {
        Path::new(&self.data_dir)
    }

    /// Directory holding one JSONL file per collection
    pub fn collections_dir(&self) -> PathBuf {
        self.data_path().join("collections")
    }

    /// Directory holding one JSON record per load job
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.data_path().join("checkpoints")
    }

    pub fn compiler_options(&self) -> CompilerOptions {
        CompilerOptions {
            validate_required: self.check_query_support,
            disable_contains: self.disable_contains,
        }
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            batch_size: self.batch_size,
            checkpoint_retries: self.checkpoint_retries,
        }
    }

    pub fn export_config(&self) -> ExportConfig {
        ExportConfig {
            timeout: self.query_timeout_ms.map(Duration::from_millis),
            info: self
                .info
                .clone()
                .unwrap_or_else(|| Value::Object(Default::default())),
        }
    }
}
