//! Candidate token extraction from raw part-number strings.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// `R` with optional digits on either side (`4R7`, `R`, `47R`).
static R_INFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]*R[0-9]*").expect("Invalid R-notation regex"));

/// `R` with at least one trailing digit (`R47`).
static R_LEADING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"R[0-9]+").expect("Invalid leading-R regex"));

/// How a token encodes its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Notation {
    DigitRun3,
    DigitRun4,
    RNotation,
}

impl Notation {
    /// Classify a token by its text. Returns `None` for shapes the decoder
    /// has no reading for.
    pub fn classify(text: &str) -> Option<Self> {
        if text.contains('R') {
            return Some(Notation::RNotation);
        }
        if !text.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        match text.len() {
            3 => Some(Notation::DigitRun3),
            4 => Some(Notation::DigitRun4),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Notation::DigitRun3 => "digit-run-3",
            Notation::DigitRun4 => "digit-run-4",
            Notation::RNotation => "r-notation",
        }
    }
}

impl fmt::Display for Notation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A substring of a part number that may encode a capacitance.
///
/// Identity is the text alone; the notation is derived from it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub notation: Notation,
}

impl Token {
    fn new(text: &str, notation: Notation) -> Self {
        Self {
            text: text.to_string(),
            notation,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.text, self.notation)
    }
}

/// Extract every candidate token from a part number.
///
/// Absent input yields an empty set. The result is de-duplicated by text and
/// ordered by text so downstream choices are reproducible.
pub fn extract_patterns(part_number: Option<&str>) -> BTreeSet<Token> {
    let mut tokens = BTreeSet::new();
    let Some(part_number) = part_number else {
        return tokens;
    };

    let chars: Vec<char> = part_number.chars().collect();
    for (len, notation) in [(3, Notation::DigitRun3), (4, Notation::DigitRun4)] {
        for window in chars.windows(len) {
            if window.iter().all(|c| c.is_ascii_digit()) {
                let text: String = window.iter().collect();
                tokens.insert(Token::new(&text, notation));
            }
        }
    }

    for regex in [&*R_INFIX_REGEX, &*R_LEADING_REGEX] {
        for m in regex.find_iter(part_number) {
            tokens.insert(Token::new(m.as_str(), Notation::RNotation));
        }
    }

    tokens
}
