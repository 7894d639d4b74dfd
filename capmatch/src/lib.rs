//! CapMatch - capacitor part-number decoding and value matching
//!
//! Decodes manufacturer part numbers into candidate capacitances (EIA
//! three/four digit codes and `R` decimal-point notation), compares them
//! with a stated value and sorts each row of a dataset into a matched or an
//! unmatched table. Large inputs are processed in parallel batches with
//! resumable checkpoints.
//!
//! # Quick Start
//!
//! ```no_run
//! use capmatch::{MatchEngine, MatchOptions};
//! use std::path::Path;
//!
//! let options = MatchOptions {
//!     output_dir: "output".into(),
//!     ..Default::default()
//! };
//! let engine = MatchEngine::new(options)
//!     .unwrap()
//!     .with_progress_callback(|processed, total, batch| {
//!         println!("batch {batch}: {processed}/{total}");
//!         Ok(())
//!     });
//! let summary = engine.process_file(Path::new("parts.csv")).unwrap();
//! println!("{} matched, {} unmatched", summary.matched_count, summary.unmatched_count);
//! ```
//!
//! # Decoding a single part number
//!
//! ```
//! use capmatch::Matcher;
//!
//! let evidence = Matcher::default()
//!     .match_fields(Some("CL10B104KB8NNNC"), Some("0.1uF"))
//!     .unwrap();
//! assert_eq!(evidence.token, "104");
//! ```

pub mod core;
pub mod dataset;
pub mod decoder;
pub mod engine;
pub mod matcher;
pub mod units;

// Re-export main types
pub use crate::core::{MatchError, MatchOptions};
pub use dataset::{Dataset, Row};
pub use decoder::{
    calculate_values, decode_token, extract_patterns, Candidate, Notation, Reading, Token,
};
pub use engine::{
    CheckpointError, CheckpointKey, CheckpointManager, CheckpointMetadata, MatchEngine,
    MatchedRow, RunState, RunStatus, RunSummary, StopHandle,
};
pub use matcher::{MatchEvidence, Matcher};
pub use units::{convert_to_pf, parse_value_column};

/// Run a file to completion with the given options (convenience wrapper).
pub fn process_file(
    input: &std::path::Path,
    options: MatchOptions,
) -> Result<RunSummary, MatchError> {
    MatchEngine::new(options)?.process_file(input)
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        MatchEngine, MatchError, MatchEvidence, MatchOptions, Matcher, RunStatus, RunSummary,
        StopHandle,
    };
}
