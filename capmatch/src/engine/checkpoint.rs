//! Checkpoint persistence.
//!
//! A checkpoint is three JSON files in the output directory: small metadata
//! plus one payload per accumulator. Every file is written to a temporary
//! sibling and renamed into place, payloads first, so the metadata file acts
//! as the commit point. Counts recorded in the metadata are checked against
//! the payloads on load, which catches a group that was only partly replaced.
//! The metadata also carries a [`CheckpointKey`]: a checkpoint is only
//! resumed by a run over the same input with the same classification settings.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::MatchOptions;
use crate::dataset::{Dataset, Row};
use crate::engine::state::{MatchedRow, RunState};

pub const CHECKPOINT_FILE: &str = "checkpoint.json";
pub const MATCHED_PAYLOAD_FILE: &str = "matched_checkpoint.json";
pub const UNMATCHED_PAYLOAD_FILE: &str = "unmatched_checkpoint.json";

/// Why a checkpoint could not be written or restored.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Checkpoint JSON error in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Checkpoint payload missing: {}", .0.display())]
    MissingPayload(PathBuf),
    #[error("{which} payload holds {found} rows, metadata says {expected}")]
    CountMismatch {
        which: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Checkpoint covers {processed_rows} rows of a {total_rows}-row input")]
    RowCount {
        processed_rows: usize,
        total_rows: usize,
    },
    #[error("Input changed since the checkpoint ({checkpoint_rows} rows, now {dataset_rows})")]
    InputChanged {
        checkpoint_rows: usize,
        dataset_rows: usize,
        checkpoint_digest: String,
        dataset_digest: String,
    },
    #[error("Checkpoint was taken with {setting} = {checkpoint}, run uses {current}")]
    SettingsChanged {
        setting: &'static str,
        checkpoint: String,
        current: String,
    },
    #[error("Accumulators hold {accumulated} rows but {processed_rows} were processed")]
    Unreconciled {
        processed_rows: usize,
        accumulated: usize,
    },
}

/// What a checkpoint must agree with before it is resumed.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointKey {
    pub total_rows: usize,
    /// [`Dataset::fingerprint`] of the input.
    pub input_digest: String,
    pub tolerance: f64,
    pub part_number_column: String,
    pub value_column: String,
}

impl CheckpointKey {
    pub fn new(dataset: &Dataset, options: &MatchOptions) -> Self {
        Self {
            total_rows: dataset.len(),
            input_digest: dataset.fingerprint(),
            tolerance: options.tolerance,
            part_number_column: options.part_number_column.clone(),
            value_column: options.value_column.clone(),
        }
    }
}

/// Lightweight checkpoint record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub processed_rows: usize,
    pub total_rows: usize,
    pub input_digest: String,
    pub tolerance: f64,
    pub part_number_column: String,
    pub value_column: String,
    pub timestamp: DateTime<Utc>,
    pub matched_count: usize,
    pub unmatched_count: usize,
    #[serde(default)]
    pub completed: bool,
}

impl CheckpointMetadata {
    fn verify_key(&self, key: &CheckpointKey) -> Result<(), CheckpointError> {
        if self.total_rows != key.total_rows || self.input_digest != key.input_digest {
            return Err(CheckpointError::InputChanged {
                checkpoint_rows: self.total_rows,
                dataset_rows: key.total_rows,
                checkpoint_digest: self.input_digest.clone(),
                dataset_digest: key.input_digest.clone(),
            });
        }
        if self.tolerance != key.tolerance {
            return Err(CheckpointError::SettingsChanged {
                setting: "tolerance",
                checkpoint: self.tolerance.to_string(),
                current: key.tolerance.to_string(),
            });
        }
        let columns = [
            ("part_number_column", &self.part_number_column, &key.part_number_column),
            ("value_column", &self.value_column, &key.value_column),
        ];
        for (setting, checkpoint, current) in columns {
            if checkpoint != current {
                return Err(CheckpointError::SettingsChanged {
                    setting,
                    checkpoint: checkpoint.clone(),
                    current: current.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Owns the checkpoint artifacts of one output directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    checkpoint_file: PathBuf,
    matched_file: PathBuf,
    unmatched_file: PathBuf,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    pretty: bool,
) -> Result<(), CheckpointError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let file = File::create(&tmp).map_err(io_error(&tmp))?;
    let mut writer = BufWriter::new(file);
    let written = if pretty {
        serde_json::to_writer_pretty(&mut writer, value)
    } else {
        serde_json::to_writer(&mut writer, value)
    };
    written.map_err(|source| CheckpointError::Parse {
        path: tmp.clone(),
        source,
    })?;
    writer.flush().map_err(io_error(&tmp))?;
    writer.get_ref().sync_all().map_err(io_error(&tmp))?;
    drop(writer);

    fs::rename(&tmp, path).map_err(io_error(path))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CheckpointError> {
    let file = File::open(path).map_err(io_error(path))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| CheckpointError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl CheckpointManager {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            checkpoint_file: output_dir.join(CHECKPOINT_FILE),
            matched_file: output_dir.join(MATCHED_PAYLOAD_FILE),
            unmatched_file: output_dir.join(UNMATCHED_PAYLOAD_FILE),
        }
    }

    pub fn checkpoint_file(&self) -> &Path {
        &self.checkpoint_file
    }

    pub fn exists(&self) -> bool {
        self.checkpoint_file.is_file()
    }

    /// Persist the state. Overwrites any earlier checkpoint.
    pub fn save_checkpoint(
        &self,
        state: &RunState,
        key: &CheckpointKey,
        completed: bool,
    ) -> Result<CheckpointMetadata, CheckpointError> {
        let total_rows = key.total_rows;
        if !state.is_reconciled() {
            return Err(CheckpointError::Unreconciled {
                processed_rows: state.processed_rows,
                accumulated: state.matched_count() + state.unmatched_count(),
            });
        }
        if state.processed_rows > total_rows {
            return Err(CheckpointError::RowCount {
                processed_rows: state.processed_rows,
                total_rows,
            });
        }

        let metadata = CheckpointMetadata {
            processed_rows: state.processed_rows,
            total_rows,
            input_digest: key.input_digest.clone(),
            tolerance: key.tolerance,
            part_number_column: key.part_number_column.clone(),
            value_column: key.value_column.clone(),
            timestamp: Utc::now(),
            matched_count: state.matched_count(),
            unmatched_count: state.unmatched_count(),
            completed,
        };

        write_json_atomic(&self.matched_file, &state.matched[..], false)?;
        write_json_atomic(&self.unmatched_file, &state.unmatched[..], false)?;
        write_json_atomic(&self.checkpoint_file, &metadata, true)?;

        tracing::info!(
            processed_rows = metadata.processed_rows,
            matched = metadata.matched_count,
            unmatched = metadata.unmatched_count,
            completed,
            "Checkpoint saved"
        );
        Ok(metadata)
    }

    /// Read only the metadata record, if present.
    pub fn read_metadata(&self) -> Result<Option<CheckpointMetadata>, CheckpointError> {
        if !self.exists() {
            return Ok(None);
        }
        read_json(&self.checkpoint_file).map(Some)
    }

    /// Restore a checkpoint taken by a run with the same `key`.
    ///
    /// `Ok(None)` means there is no checkpoint; `Err` means there is one but
    /// it cannot be trusted or belongs to another input or settings.
    pub fn load_checkpoint(
        &self,
        key: &CheckpointKey,
    ) -> Result<Option<RunState>, CheckpointError> {
        let Some(metadata) = self.read_metadata()? else {
            return Ok(None);
        };

        if metadata.processed_rows > metadata.total_rows {
            return Err(CheckpointError::RowCount {
                processed_rows: metadata.processed_rows,
                total_rows: metadata.total_rows,
            });
        }
        metadata.verify_key(key)?;
        let accumulated = metadata.matched_count + metadata.unmatched_count;
        if accumulated != metadata.processed_rows {
            return Err(CheckpointError::Unreconciled {
                processed_rows: metadata.processed_rows,
                accumulated,
            });
        }

        for payload in [&self.matched_file, &self.unmatched_file] {
            if !payload.is_file() {
                return Err(CheckpointError::MissingPayload(payload.clone()));
            }
        }
        let matched: Vec<MatchedRow> = read_json(&self.matched_file)?;
        let unmatched: Vec<Row> = read_json(&self.unmatched_file)?;

        if matched.len() != metadata.matched_count {
            return Err(CheckpointError::CountMismatch {
                which: "matched",
                expected: metadata.matched_count,
                found: matched.len(),
            });
        }
        if unmatched.len() != metadata.unmatched_count {
            return Err(CheckpointError::CountMismatch {
                which: "unmatched",
                expected: metadata.unmatched_count,
                found: unmatched.len(),
            });
        }

        Ok(Some(RunState {
            processed_rows: metadata.processed_rows,
            matched,
            unmatched,
        }))
    }

    /// Restore a usable checkpoint or fall back to a fresh start. Never fails.
    pub fn resume_state(&self, key: &CheckpointKey) -> Option<RunState> {
        match self.load_checkpoint(key) {
            Ok(Some(state)) => {
                tracing::info!(
                    processed_rows = state.processed_rows,
                    "Resuming from checkpoint"
                );
                Some(state)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(
                    path = %self.checkpoint_file.display(),
                    error = %e,
                    "Discarding unusable checkpoint, starting fresh"
                );
                None
            }
        }
    }

    /// Remove all checkpoint artifacts. Missing files are not an error.
    pub fn clear_checkpoint(&self) -> Result<(), CheckpointError> {
        // metadata first so a half-cleared group is never mistaken for a checkpoint
        for path in [&self.checkpoint_file, &self.matched_file, &self.unmatched_file] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(path)(e)),
            }
        }
        Ok(())
    }
}
