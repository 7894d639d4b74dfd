//! Run state and per-batch results.
//!
//! Workers produce an immutable [`BatchResult`]; only the scheduler folds
//! results into the [`RunState`] it owns.

use serde::{Deserialize, Serialize};

use crate::dataset::Row;
use crate::matcher::{MatchEvidence, Matcher};

/// A row that matched, with the evidence for the match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRow {
    pub row: Row,
    pub evidence: MatchEvidence,
}

/// Outcome of one batch of rows.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub rows: usize,
    pub matched: Vec<MatchedRow>,
    pub unmatched: Vec<Row>,
}

/// Classify every row of a batch.
pub fn run_batch(rows: &[Row], matcher: &Matcher) -> BatchResult {
    let mut result = BatchResult {
        rows: rows.len(),
        ..Default::default()
    };
    for row in rows {
        match matcher.match_fields(row.part_number.as_deref(), row.value.as_deref()) {
            Some(evidence) => result.matched.push(MatchedRow {
                row: row.clone(),
                evidence,
            }),
            None => result.unmatched.push(row.clone()),
        }
    }
    result
}

/// Progress and accumulated results of a run.
///
/// `processed_rows` always counts a prefix of the input: batches are merged
/// in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    pub processed_rows: usize,
    pub matched: Vec<MatchedRow>,
    pub unmatched: Vec<Row>,
}

impl RunState {
    pub fn merge(&mut self, batch: BatchResult) {
        self.processed_rows += batch.rows;
        self.matched.extend(batch.matched);
        self.unmatched.extend(batch.unmatched);
    }

    pub fn matched_count(&self) -> usize {
        self.matched.len()
    }

    pub fn unmatched_count(&self) -> usize {
        self.unmatched.len()
    }

    /// `matched + unmatched == processed_rows`
    pub fn is_reconciled(&self) -> bool {
        self.matched.len() + self.unmatched.len() == self.processed_rows
    }

    /// Order both accumulators by source row index.
    pub fn sort_by_index(&mut self) {
        self.matched.sort_by_key(|m| m.row.index);
        self.unmatched.sort_by_key(|r| r.index);
    }
}
