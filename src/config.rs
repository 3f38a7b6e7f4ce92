//! Compactor configuration.
//!
//! Loaded from a JSON file; every field has a default so a file only needs
//! to name the source bucket.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::day::DayKey;
use crate::store::DEFAULT_PAGE_SIZE;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactorConfig {
    /// Bucket holding the per-request log objects.
    pub source_bucket: String,

    /// Key prefix to list under.
    pub source_prefix: String,

    /// Directory receiving `<day>.csv.gz` archives.
    /// Default: `compacted`
    pub output_dir: PathBuf,

    /// Wall-clock budget for a whole run.
    /// Default: 60 seconds
    pub timeout_secs: u64,

    /// Fetch workers per day. `None` uses the available parallelism.
    pub workers: Option<usize>,

    /// Parsed batches buffered between workers and the merge.
    /// Default: 10
    pub results_capacity: usize,

    /// Keys requested per listing page.
    /// Default: 1000
    pub list_page_size: usize,

    /// Day token derivation.
    /// Default: first 10 characters of the base name
    pub day_key: DayKey,

    pub malformed_policy: MalformedPolicy,

    pub fetch_failure_policy: FetchFailurePolicy,

    /// Upper bound on lines held in memory for one day.
    pub max_day_lines: Option<usize>,
}

impl Default for CompactorConfig {
    fn default() -> Self {
        Self {
            source_bucket: String::new(),
            source_prefix: String::new(),
            output_dir: PathBuf::from("compacted"),
            timeout_secs: 60,
            workers: None,
            results_capacity: 10,
            list_page_size: DEFAULT_PAGE_SIZE,
            day_key: DayKey::default(),
            malformed_policy: MalformedPolicy::default(),
            fetch_failure_policy: FetchFailurePolicy::default(),
            max_day_lines: None,
        }
    }
}

/// What to do with a record whose quoted or bracketed field never closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Drop the record, keep the rest of the object.
    #[default]
    SkipLine,
    /// Drop everything the object contributed and report it as failed.
    RejectObject,
}

/// What a failed fetch means for the rest of its day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailurePolicy {
    /// Record the failure and keep fetching the remaining objects.
    #[default]
    Continue,
    /// Stop every worker of the day and fail the day.
    AbortDay,
}

impl CompactorConfig {
    pub fn new(source_bucket: impl Into<String>) -> Self {
        Self {
            source_bucket: source_bucket.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON config file without validating it, so callers can apply
    /// overrides first.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        serde_json::from_slice(&data)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_bucket.is_empty() {
            return Err(Error::Config("source_bucket is required".into()));
        }
        if self.results_capacity == 0 {
            return Err(Error::Config("results_capacity must be at least 1".into()));
        }
        if self.list_page_size == 0 {
            return Err(Error::Config("list_page_size must be at least 1".into()));
        }
        if self.workers == Some(0) {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        if let DayKey::BaseName { len: 0 } = self.day_key {
            return Err(Error::Config("day_key len must be at least 1".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn worker_count(&self) -> usize {
        self.workers
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
            .max(1)
    }
}
