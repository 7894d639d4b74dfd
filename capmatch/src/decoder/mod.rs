//! Part-number decoding: token extraction and value readings.

pub mod patterns;
pub mod values;

pub use patterns::{extract_patterns, Notation, Token};
pub use values::{calculate_values, decode_token, Candidate, Reading};
