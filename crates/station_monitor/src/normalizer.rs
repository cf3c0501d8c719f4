//! Maps the availability text of a station card onto a [`NormalizedState`].

use lazy_static::lazy_static;
use regex::Regex;

use crate::monitor_types::{FetchError, NormalizedState, Observation, StationReading};

/// Phrases meaning the station is out of fuel. Checked first: "no disponible"
/// contains "disponible".
const NO_STOCK_PHRASES: &[&str] = &[
    "sin stock",
    "sin saldo",
    "sin existencia",
    "sin combustible",
    "agotado",
    "no disponible",
    "no hay",
];

/// Phrases meaning a load has arrived.
const LOAD_PHRASES: &[&str] = &[
    "nueva carga",
    "en carga",
    "descargando",
    "disponible",
    "con saldo",
];

const PLACEHOLDERS: &[&str] = &["n/a", "-", "--"];

lazy_static! {
    /// A litre figure such as `12.500`, `8,000` or `0`.
    static ref QUANTITY_REGEX: Regex =
        Regex::new(r"\d{1,3}(?:[.,]\d{3})+|\d+").expect("quantity pattern is valid");
}

/// Classify raw availability text. Unmatched text is `Unknown`, never an error.
pub fn normalize(raw: &str) -> NormalizedState {
    let text = raw.trim().to_lowercase();

    if text.is_empty() || PLACEHOLDERS.contains(&text.as_str()) {
        return NormalizedState::Unknown;
    }

    if NO_STOCK_PHRASES.iter().any(|phrase| text.contains(phrase)) {
        return NormalizedState::NoStock;
    }

    // "0 Lts. disponibles": a leading zero quantity outranks the wording.
    if leading_litres(&text) == Some(0) {
        return NormalizedState::NoStock;
    }

    if LOAD_PHRASES.iter().any(|phrase| text.contains(phrase)) {
        return NormalizedState::LoadAvailable;
    }

    match parse_litres(&text) {
        Some(0) => NormalizedState::NoStock,
        Some(_) => NormalizedState::LoadAvailable,
        None => NormalizedState::Unknown,
    }
}

/// First litre quantity in the text, thousands separators removed. Figures
/// too large for a `u64` saturate to `u64::MAX`.
pub fn parse_litres(text: &str) -> Option<u64> {
    QUANTITY_REGEX.find(text).map(|m| quantity_value(m.as_str()))
}

/// Quantity the text opens with, if it opens with one.
fn leading_litres(text: &str) -> Option<u64> {
    QUANTITY_REGEX
        .find(text)
        .filter(|m| m.start() == 0)
        .map(|m| quantity_value(m.as_str()))
}

fn quantity_value(quantity: &str) -> u64 {
    let digits: String = quantity.chars().filter(|c| c.is_ascii_digit()).collect();
    let significant = digits.trim_start_matches('0');

    if significant.is_empty() {
        0
    } else {
        significant.parse().unwrap_or(u64::MAX)
    }
}

/// Turn a fetch result into an observation, flagging fetch failures.
pub fn normalize_fetch(result: Result<StationReading, FetchError>) -> Observation {
    match result {
        Ok(reading) => Observation {
            state: normalize(&reading.availability),
            fetch_failed: false,
            reading: Some(reading),
        },
        Err(_) => Observation::fetch_failure(),
    }
}
