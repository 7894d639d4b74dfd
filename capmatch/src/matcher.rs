//! Match decision between decoded candidates and a stated value.

use serde::{Deserialize, Serialize};

use crate::decoder::{decode_token, extract_patterns, Notation, Reading};
use crate::units::normalize_value;

/// Relative tolerance used when none is configured (1%).
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Which token and reading agreed with the stated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvidence {
    pub token: String,
    pub notation: Notation,
    pub reading: Reading,
    pub candidate_pf: f64,
    pub target_pf: f64,
}

impl MatchEvidence {
    /// `|candidate - target| / target`
    pub fn relative_error(&self) -> f64 {
        relative_error(self.candidate_pf, self.target_pf)
    }
}

fn relative_error(candidate: f64, target: f64) -> f64 {
    (candidate - target).abs() / target
}

/// Compares every candidate of a part number against its stated value.
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    tolerance: f64,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl Matcher {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// True if `candidate` is within tolerance of a positive `target`.
    pub fn agrees(&self, candidate: f64, target: f64) -> bool {
        target > 0.0 && candidate.is_finite() && relative_error(candidate, target) <= self.tolerance
    }

    /// Find the closest agreeing candidate for a part number / value pair.
    ///
    /// Returns `None` when nothing agrees, including when the part number has
    /// no tokens or the value does not parse. Ties keep the first token in
    /// text order.
    pub fn match_fields(
        &self,
        part_number: Option<&str>,
        value: Option<&str>,
    ) -> Option<MatchEvidence> {
        let target_pf = normalize_value(value);
        if target_pf <= 0.0 {
            return None;
        }

        let mut best: Option<MatchEvidence> = None;
        for token in extract_patterns(part_number) {
            for candidate in decode_token(&token.text) {
                if !self.agrees(candidate.value_pf, target_pf) {
                    continue;
                }
                let error = relative_error(candidate.value_pf, target_pf);
                if best.as_ref().is_some_and(|b| b.relative_error() <= error) {
                    continue;
                }
                best = Some(MatchEvidence {
                    token: token.text.clone(),
                    notation: token.notation,
                    reading: candidate.reading,
                    candidate_pf: candidate.value_pf,
                    target_pf,
                });
            }
        }
        best
    }
}
