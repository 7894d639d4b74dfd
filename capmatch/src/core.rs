//! Errors and run options shared by the engine and its front ends.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::engine::checkpoint::CheckpointError;
use crate::matcher::DEFAULT_TOLERANCE;

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("CSV error in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Required column '{column}' not found in {}", .path.display())]
    MissingColumn { column: String, path: PathBuf },
    #[error("Cannot create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot read config file {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rayon::ThreadPoolBuildError> for MatchError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        MatchError::WorkerPool(e.to_string())
    }
}

/// Options for a matching run (CLI or embedding application).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    /// Rows per unit of parallel work.
    pub batch_size: usize,
    /// Worker pool size.
    pub num_threads: usize,
    /// Rows between persisted checkpoints.
    pub checkpoint_interval: usize,
    /// Relative tolerance for the match decision.
    pub tolerance: f64,
    pub part_number_column: String,
    pub value_column: String,
    /// Directory for output tables and checkpoint artifacts.
    pub output_dir: PathBuf,
    /// Resume from an existing checkpoint when one is present.
    pub resume: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            num_threads: 4,
            checkpoint_interval: 5_000,
            tolerance: DEFAULT_TOLERANCE,
            part_number_column: "part_number".to_string(),
            value_column: "value".to_string(),
            output_dir: PathBuf::from("output"),
            resume: true,
        }
    }
}

impl MatchOptions {
    /// Load options from a JSON file. Missing keys keep their defaults.
    pub fn from_json_file(path: &std::path::Path) -> Result<Self, MatchError> {
        let content = std::fs::read_to_string(path).map_err(|source| MatchError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content)
            .map_err(|e| MatchError::InvalidOptions(format!("{}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.batch_size == 0 {
            return Err(MatchError::InvalidOptions("batch_size must be at least 1".into()));
        }
        if self.num_threads == 0 {
            return Err(MatchError::InvalidOptions("num_threads must be at least 1".into()));
        }
        if self.checkpoint_interval == 0 {
            return Err(MatchError::InvalidOptions(
                "checkpoint_interval must be at least 1".into(),
            ));
        }
        if !self.tolerance.is_finite() || !(0.0..1.0).contains(&self.tolerance) {
            return Err(MatchError::InvalidOptions(format!(
                "tolerance must be in [0, 1), got {}",
                self.tolerance
            )));
        }
        if self.part_number_column.trim().is_empty() || self.value_column.trim().is_empty() {
            return Err(MatchError::InvalidOptions("column names must not be empty".into()));
        }
        Ok(())
    }
}
