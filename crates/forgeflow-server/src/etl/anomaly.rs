//! Anomaly mapping
//!
//! Field names map to codes of the `anomalie` reference table. Fields without
//! an entry fall back to [`UNKNOWN_ANOMALY_CODE`].

use serde::Serialize;

use super::record::{fields, FieldViolation};

/// Code assigned to violations on fields absent from the table
pub const UNKNOWN_ANOMALY_CODE: i32 = 999;

/// Note attached to anomalies declared by the source itself
pub const REPORTED_BY_SOURCE_NOTE: &str = "anomaly reported by source";

const FIELD_CODES: &[(&str, i32)] = &[
    (fields::ENDED_AT, 1),
    (fields::WEIGHT, 2),
    (fields::TEMPERATURE, 3),
    (fields::ANOMALIES, 4),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anomaly {
    pub field: String,
    pub code: i32,
    pub note: String,
}

pub fn code_for(field: &str) -> i32 {
    FIELD_CODES
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, code)| *code)
        .unwrap_or(UNKNOWN_ANOMALY_CODE)
}

/// One anomaly per violation, in the same order
pub fn map(violations: &[FieldViolation]) -> Vec<Anomaly> {
    violations
        .iter()
        .map(|violation| Anomaly {
            field: violation.field.clone(),
            code: code_for(&violation.field),
            note: violation.to_string(),
        })
        .collect()
}

/// Anomalies for ids the source put in the record's `anomalia` list
pub fn reported(ids: &[i32]) -> Vec<Anomaly> {
    ids.iter()
        .map(|id| Anomaly {
            field: fields::ANOMALIES.to_string(),
            code: *id,
            note: REPORTED_BY_SOURCE_NOTE.to_string(),
        })
        .collect()
}
