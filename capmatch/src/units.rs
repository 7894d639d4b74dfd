//! Stated-value parsing and normalisation to picofarads.

use std::sync::LazyLock;

use regex::Regex;

static MAGNITUDE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9.]+").expect("Invalid magnitude regex"));

static UNIT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Zµμ]+").expect("Invalid unit regex"));

/// Unit assumed when the value field carries none.
pub const BASE_UNIT: &str = "pf";

/// Capacitance units understood by [`convert_to_pf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacitanceUnit {
    Picofarad,
    Nanofarad,
    Microfarad,
    Millifarad,
    Farad,
}

impl CapacitanceUnit {
    /// Look up a unit symbol, ignoring case and surrounding whitespace.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim().to_lowercase().as_str() {
            "pf" => Some(Self::Picofarad),
            "nf" => Some(Self::Nanofarad),
            "uf" | "µf" | "μf" => Some(Self::Microfarad),
            "mf" => Some(Self::Millifarad),
            "f" => Some(Self::Farad),
            _ => None,
        }
    }

    /// Multiplier from this unit to picofarads.
    pub fn pf_scale(&self) -> f64 {
        match self {
            Self::Picofarad => 1.0,
            Self::Nanofarad => 1e3,
            Self::Microfarad => 1e6,
            Self::Millifarad => 1e9,
            Self::Farad => 1e12,
        }
    }
}

/// Split a raw value field into magnitude and lower-cased unit symbol.
///
/// Absent or number-less input yields `(0.0, "pf")`; a missing unit
/// defaults to `"pf"`.
pub fn parse_value_column(raw: Option<&str>) -> (f64, String) {
    let fallback = || (0.0, BASE_UNIT.to_string());
    let Some(raw) = raw else {
        return fallback();
    };
    let raw = raw.trim();

    let Some(magnitude) = MAGNITUDE_REGEX.find(raw) else {
        return fallback();
    };
    // "." or "1.2.3" match the pattern without being numbers
    let Ok(magnitude) = magnitude.as_str().parse::<f64>() else {
        return fallback();
    };

    let unit = UNIT_REGEX
        .find(raw)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_else(|| BASE_UNIT.to_string());
    (magnitude, unit)
}

/// Rescale a magnitude to picofarads.
///
/// Zero or NaN magnitudes short-circuit to zero. Unknown units are treated
/// as already being in picofarads.
pub fn convert_to_pf(magnitude: f64, unit: &str) -> f64 {
    if magnitude.is_nan() || magnitude == 0.0 {
        return 0.0;
    }
    match CapacitanceUnit::from_symbol(unit) {
        Some(unit) => magnitude * unit.pf_scale(),
        None => {
            tracing::debug!(unit = %unit, "Unrecognised capacitance unit, assuming pF");
            magnitude
        }
    }
}

/// Parse and normalise a raw value field in one step.
pub fn normalize_value(raw: Option<&str>) -> f64 {
    let (magnitude, unit) = parse_value_column(raw);
    convert_to_pf(magnitude, &unit)
}
