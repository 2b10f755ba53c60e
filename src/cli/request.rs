//! ADC request bodies
//!
//! ```json
//! {"filters": {...}, "from": 0, "size": 100, "fields": ["v_call"],
//!  "include_fields": "airr-core", "facets": "v_call", "format": "tsv"}
//! ```
//!
//! Also the load manifest: a JSON array of jobs.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::schema::{PROFILE_AIRR_CORE, PROFILE_AIRR_SCHEMA, PROFILE_MIAIRR};

use super::errors::{CliError, CliResult};

/// Parsed ADC query request
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdcRequest {
    #[serde(default)]
    pub filters: Option<Value>,
    #[serde(default)]
    pub from: Option<f64>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub include_fields: Option<String>,
    #[serde(default)]
    pub facets: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

impl AdcRequest {
    pub fn from_value(value: Value) -> CliResult<Self> {
        let request: AdcRequest = serde_json::from_value(value)
            .map_err(|e| CliError::invalid_request(format!("Invalid ADC request: {}", e)))?;
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> CliResult<()> {
        if let Some(from) = self.from {
            if !from.is_finite() || from < 0.0 {
                return Err(CliError::invalid_request("from must be a non-negative number"));
            }
        }
        if let Some(profile) = &self.include_fields {
            if ![PROFILE_AIRR_CORE, PROFILE_AIRR_SCHEMA, PROFILE_MIAIRR].contains(&profile.as_str()) {
                return Err(CliError::invalid_request(format!(
                    "Unknown include_fields '{}'",
                    profile
                )));
            }
        }
        Ok(())
    }

    /// Records to skip, floored
    pub fn skip(&self) -> usize {
        self.from.map(|f| f.floor() as usize).unwrap_or(0)
    }
}

/// One job of a load manifest
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestJob {
    pub repertoire_id: String,
    #[serde(default)]
    pub data_processing_id: Option<String>,
    #[serde(default)]
    pub checkpoint_id: Option<String>,
    pub files: Vec<PathBuf>,
}

/// Parse a load manifest
pub fn parse_manifest(text: &str) -> CliResult<Vec<ManifestJob>> {
    let jobs: Vec<ManifestJob> = serde_json::from_str(text)
        .map_err(|e| CliError::invalid_request(format!("Invalid manifest: {}", e)))?;
    if jobs.is_empty() {
        return Err(CliError::invalid_request("Manifest lists no jobs"));
    }
    let mut seen = HashSet::new();
    for job in &jobs {
        if !seen.insert(job.repertoire_id.as_str()) {
            return Err(CliError::invalid_request(format!(
                "Manifest lists repertoire '{}' more than once",
                job.repertoire_id
            )));
        }
    }
    let mut checkpoint_ids = HashSet::new();
    for id in jobs.iter().filter_map(|job| job.checkpoint_id.as_deref()) {
        if !checkpoint_ids.insert(id) {
            return Err(CliError::invalid_request(format!(
                "Manifest reuses checkpoint id '{}'",
                id
            )));
        }
    }
    Ok(jobs)
}
