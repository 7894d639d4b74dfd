//! Batch scheduling over a worker pool.
//!
//! Rows are cut into contiguous batches. Up to `num_threads` batches run at
//! once on a rayon pool; the wave is joined and its results are merged in
//! input order, so `processed_rows` always names a finished prefix of the
//! input and a resumed run never skips or repeats a row.

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::core::{MatchError, MatchOptions};
use crate::dataset::{write_matched, write_unmatched, Dataset};
use crate::engine::checkpoint::{CheckpointKey, CheckpointManager};
use crate::engine::state::{run_batch, BatchResult, RunState};
use crate::matcher::Matcher;

pub const MATCHED_OUTPUT_FILE: &str = "matched.csv";
pub const UNMATCHED_OUTPUT_FILE: &str = "unmatched.csv";

/// Notification hook called after each merged batch with
/// `(processed_rows, total_rows, batch_number)`.
///
/// Errors and panics raised by the hook are logged and otherwise ignored.
pub type ProgressCallback = Box<dyn Fn(usize, usize, usize) -> anyhow::Result<()> + Send + Sync>;

/// Requests a stop at the next batch boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Stopped,
}

/// What a run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub total_rows: usize,
    pub processed_rows: usize,
    /// Rows already covered by the checkpoint the run resumed from.
    pub resumed_from: usize,
    pub matched_count: usize,
    pub unmatched_count: usize,
    /// Batches processed by this run.
    pub batches: usize,
    pub matched_path: Option<PathBuf>,
    pub unmatched_path: Option<PathBuf>,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// `matched + unmatched == processed`
    pub fn is_reconciled(&self) -> bool {
        self.matched_count + self.unmatched_count == self.processed_rows
    }
}

/// Contiguous batch ranges for the next wave, starting at `start`.
pub fn plan_wave(
    start: usize,
    total: usize,
    batch_size: usize,
    max_batches: usize,
) -> Vec<Range<usize>> {
    let mut ranges = Vec::with_capacity(max_batches);
    let mut begin = start;
    while begin < total && ranges.len() < max_batches {
        let end = (begin + batch_size).min(total);
        ranges.push(begin..end);
        begin = end;
    }
    ranges
}

/// Drives a full matching run.
pub struct MatchEngine {
    options: MatchOptions,
    progress: Option<ProgressCallback>,
    stop: StopHandle,
}

impl MatchEngine {
    pub fn new(options: MatchOptions) -> Result<Self, MatchError> {
        options.validate()?;
        Ok(Self {
            options,
            progress: None,
            stop: StopHandle::default(),
        })
    }

    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize, usize) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn checkpoints(&self) -> CheckpointManager {
        CheckpointManager::new(&self.options.output_dir)
    }

    /// Read `input` and run it to completion (or until stopped).
    pub fn process_file(&self, input: &Path) -> Result<RunSummary, MatchError> {
        let dataset = Dataset::from_csv(
            input,
            &self.options.part_number_column,
            &self.options.value_column,
        )?;
        self.process_dataset(&dataset)
    }

    /// Run an already loaded dataset.
    pub fn process_dataset(&self, dataset: &Dataset) -> Result<RunSummary, MatchError> {
        let output_dir = &self.options.output_dir;
        std::fs::create_dir_all(output_dir).map_err(|source| MatchError::OutputDir {
            path: output_dir.clone(),
            source,
        })?;

        let checkpoints = self.checkpoints();
        let key = CheckpointKey::new(dataset, &self.options);
        let total = key.total_rows;
        let mut state = if self.options.resume {
            checkpoints.resume_state(&key).unwrap_or_default()
        } else {
            RunState::default()
        };
        let resumed_from = state.processed_rows;

        tracing::info!(
            total_rows = total,
            resumed_from,
            batch_size = self.options.batch_size,
            num_threads = self.options.num_threads,
            "Starting matching run"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.num_threads)
            .thread_name(|i| format!("capmatch-worker-{i}"))
            .build()?;
        let matcher = Matcher::new(self.options.tolerance);
        let interval = self.options.checkpoint_interval;

        let mut batches = 0;
        let mut checkpoint_mark = state.processed_rows / interval;
        let mut saved_rows = state.processed_rows;
        let mut stopped = false;

        while state.processed_rows < total {
            if self.stop.is_stop_requested() {
                stopped = true;
                break;
            }

            let wave = plan_wave(
                state.processed_rows,
                total,
                self.options.batch_size,
                self.options.num_threads,
            );
            let results: Vec<BatchResult> = pool.install(|| {
                wave.par_iter()
                    .map(|range| run_batch(&dataset.rows[range.clone()], &matcher))
                    .collect()
            });

            for result in results {
                let rows = result.rows;
                state.merge(result);
                batches += 1;
                tracing::debug!(
                    batch = batches,
                    rows,
                    processed_rows = state.processed_rows,
                    "Merged batch"
                );
                self.notify(state.processed_rows, total, batches);

                let mark = state.processed_rows / interval;
                if mark > checkpoint_mark {
                    checkpoints.save_checkpoint(&state, &key, false)?;
                    checkpoint_mark = mark;
                    saved_rows = state.processed_rows;
                }
            }
        }

        if stopped {
            if saved_rows != state.processed_rows {
                checkpoints.save_checkpoint(&state, &key, false)?;
            }
            tracing::info!(
                processed_rows = state.processed_rows,
                total_rows = total,
                "Run stopped at batch boundary"
            );
            return Ok(self.summary(&state, total, resumed_from, batches, RunStatus::Stopped, None));
        }

        state.sort_by_index();
        let matched_path = write_matched(
            &output_dir.join(MATCHED_OUTPUT_FILE),
            &dataset.headers,
            &state.matched,
        )?;
        let unmatched_path = write_unmatched(
            &output_dir.join(UNMATCHED_OUTPUT_FILE),
            &dataset.headers,
            &state.unmatched,
        )?;
        checkpoints.save_checkpoint(&state, &key, true)?;

        tracing::info!(
            processed_rows = state.processed_rows,
            matched = state.matched_count(),
            unmatched = state.unmatched_count(),
            "Matching run completed"
        );
        Ok(self.summary(
            &state,
            total,
            resumed_from,
            batches,
            RunStatus::Completed,
            Some((matched_path, unmatched_path)),
        ))
    }

    fn notify(&self, processed: usize, total: usize, batch_number: usize) {
        let Some(callback) = &self.progress else {
            return;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| callback(processed, total, batch_number))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, batch = batch_number, "Progress callback failed")
            }
            Err(_) => tracing::warn!(batch = batch_number, "Progress callback panicked"),
        }
    }

    fn summary(
        &self,
        state: &RunState,
        total: usize,
        resumed_from: usize,
        batches: usize,
        status: RunStatus,
        outputs: Option<(PathBuf, PathBuf)>,
    ) -> RunSummary {
        let (matched_path, unmatched_path) = outputs.unzip();
        RunSummary {
            status,
            total_rows: total,
            processed_rows: state.processed_rows,
            resumed_from,
            matched_count: state.matched_count(),
            unmatched_count: state.unmatched_count(),
            batches,
            matched_path,
            unmatched_path,
        }
    }
}
