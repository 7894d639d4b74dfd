//! Numeric readings of a single token.
//!
//! EIA codes are ambiguous about which end carries the multiplier, so every
//! plausible reading is produced and the matcher decides which one (if any)
//! agrees with the stated value.

use serde::{Deserialize, Serialize};

/// Which rule produced a candidate value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reading {
    /// `R` stands in for the decimal point (`4R7` = 4.7).
    DecimalPoint,
    /// Leading digits are the mantissa, last digit the power of ten.
    Multiplier,
    /// Last digit 7/8/9 read as a negative power of ten.
    FractionalMultiplier,
    /// First digit is the power of ten, the rest the mantissa.
    LeadingMultiplier,
}

impl Reading {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reading::DecimalPoint => "decimal_point",
            Reading::Multiplier => "multiplier",
            Reading::FractionalMultiplier => "fractional_multiplier",
            Reading::LeadingMultiplier => "leading_multiplier",
        }
    }
}

/// A decoded value in picofarads together with the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub value_pf: f64,
    pub reading: Reading,
}

impl Candidate {
    fn new(value_pf: f64, reading: Reading) -> Self {
        Self { value_pf, reading }
    }
}

/// Decode a token into its candidate readings.
pub fn decode_token(token: &str) -> Vec<Candidate> {
    if token.contains('R') {
        return decode_r_notation(token).into_iter().collect();
    }
    if is_eia_code(token) {
        return decode_eia(token);
    }
    Vec::new()
}

/// Candidate values for a token, without reading labels.
pub fn calculate_values(token: &str) -> Vec<f64> {
    decode_token(token).into_iter().map(|c| c.value_pf).collect()
}

fn all_digits(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_digit())
}

fn is_eia_code(token: &str) -> bool {
    matches!(token.len(), 3 | 4) && all_digits(token)
}

fn decode_r_notation(token: &str) -> Option<Candidate> {
    if let Some(fraction) = token.strip_prefix('R') {
        if fraction.is_empty() || !all_digits(fraction) {
            return None;
        }
        let value = format!("0.{fraction}").parse::<f64>().ok()?;
        return Some(Candidate::new(value, Reading::DecimalPoint));
    }

    let parts: Vec<&str> = token.split('R').collect();
    let &[whole, fraction] = parts.as_slice() else {
        return None;
    };
    if !all_digits(whole) || !all_digits(fraction) {
        return None;
    }
    let whole = if whole.is_empty() { "0" } else { whole };
    let fraction = if fraction.is_empty() { "0" } else { fraction };
    let value = format!("{whole}.{fraction}").parse::<f64>().ok()?;
    Some(Candidate::new(value, Reading::DecimalPoint))
}

/// `mantissa * 10^exponent`, dividing for negative exponents to keep
/// values like 4.7 exact.
fn scale(mantissa: u64, exponent: i32) -> f64 {
    let mantissa = mantissa as f64;
    if exponent >= 0 {
        mantissa * 10f64.powi(exponent)
    } else {
        mantissa / 10f64.powi(-exponent)
    }
}

fn decode_eia(digits: &str) -> Vec<Candidate> {
    // Caller guarantees 3 or 4 ASCII digits.
    let (head, last) = digits.split_at(digits.len() - 1);
    let (first, tail) = digits.split_at(1);
    let (Ok(mantissa), Ok(exponent), Ok(lead_exponent), Ok(lead_mantissa)) = (
        head.parse::<u64>(),
        last.parse::<i32>(),
        first.parse::<i32>(),
        tail.parse::<u64>(),
    ) else {
        return Vec::new();
    };

    let mut candidates = vec![Candidate::new(
        scale(mantissa, exponent),
        Reading::Multiplier,
    )];

    let fractional: &[i32] = match exponent {
        7 | 9 => &[-1, -3],
        8 => &[-2],
        _ => &[],
    };
    candidates.extend(
        fractional
            .iter()
            .map(|&e| Candidate::new(scale(mantissa, e), Reading::FractionalMultiplier)),
    );

    candidates.push(Candidate::new(
        scale(lead_mantissa, lead_exponent),
        Reading::LeadingMultiplier,
    ));
    candidates
}
