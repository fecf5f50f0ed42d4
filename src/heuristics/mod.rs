// src/heuristics/mod.rs

mod fields;

use chrono::NaiveDate;
use serde::Serialize;

/// Best-effort fields recovered from recognized invoice text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScanFields {
    pub amount: Option<f64>,
    pub date: Option<NaiveDate>,
}

/// Extract amount and date from raw recognized text.
///
/// The two extractions are independent: a miss on one never blocks the other.
/// Pure and deterministic: same text, same result, no locale involvement.
pub fn extract_fields(text: &str) -> ScanFields {
    ScanFields {
        amount: fields::extract_amount(text),
        date: fields::extract_date(text),
    }
}
