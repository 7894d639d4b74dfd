//! Batch-parallel, checkpointed execution of the matching pipeline.
//!
//! ```text
//! rows ──▶ plan_wave ──▶ worker pool (run_batch × num_threads)
//!                               │
//!                               ▼  in input order
//!                        RunState::merge ──▶ progress callback
//!                               │
//!                               ▼  every checkpoint_interval rows
//!                        CheckpointManager::save_checkpoint
//! ```

pub mod checkpoint;
pub mod scheduler;
pub mod state;

pub use checkpoint::{CheckpointError, CheckpointKey, CheckpointManager, CheckpointMetadata};
pub use scheduler::{MatchEngine, ProgressCallback, RunStatus, RunSummary, StopHandle};
pub use state::{run_batch, BatchResult, MatchedRow, RunState};
