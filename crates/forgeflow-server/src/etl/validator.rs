//! Record validation
//!
//! Every rule runs independently and every failing field is reported. A record
//! either normalizes completely or yields the full violation list together
//! with a sanitized copy where each offending field is nulled out.

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::{
    fields, DetailRow, FieldViolation, LoadableOperation, NormalizedOperation, OperationDetail,
    OperationHeader, OperationType, RawRecord,
};
use super::timestamp::{normalize_at, TimestampInput, DEFAULT_TOLERANCE_MINUTES};

pub const DEFAULT_WEIGHT_MIN: f64 = 0.0;
pub const DEFAULT_WEIGHT_MAX: f64 = 1000.0;
pub const DEFAULT_TEMPERATURE_MIN: f64 = 700.0;
pub const DEFAULT_TEMPERATURE_MAX: f64 = 1200.0;

/// Acceptance bounds applied by the validator. Ranges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    pub tolerance_minutes: i64,
    pub weight_min: f64,
    pub weight_max: f64,
    pub temperature_min: f64,
    pub temperature_max: f64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            tolerance_minutes: DEFAULT_TOLERANCE_MINUTES,
            weight_min: DEFAULT_WEIGHT_MIN,
            weight_max: DEFAULT_WEIGHT_MAX,
            temperature_min: DEFAULT_TEMPERATURE_MIN,
            temperature_max: DEFAULT_TEMPERATURE_MAX,
        }
    }
}

/// Result of checking one record
#[derive(Debug, Clone, PartialEq)]
pub enum Checked {
    Valid(NormalizedOperation),
    Invalid {
        sanitized: LoadableOperation,
        violations: Vec<FieldViolation>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RecordValidator {
    policy: ValidationPolicy,
}

impl RecordValidator {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    pub fn validate(&self, raw: &RawRecord) -> Result<NormalizedOperation, Vec<FieldViolation>> {
        self.validate_at(raw, Utc::now().naive_utc())
    }

    pub fn validate_at(
        &self,
        raw: &RawRecord,
        now: NaiveDateTime,
    ) -> Result<NormalizedOperation, Vec<FieldViolation>> {
        match self.check_at(raw, now) {
            Checked::Valid(op) => Ok(op),
            Checked::Invalid { violations, .. } => Err(violations),
        }
    }

    pub fn check(&self, raw: &RawRecord) -> Checked {
        self.check_at(raw, Utc::now().naive_utc())
    }

    pub fn check_at(&self, raw: &RawRecord, now: NaiveDateTime) -> Checked {
        let mut violations = Vec::new();

        let order_id = collect(&mut violations, fields::ORDER_ID, required_integer(raw, fields::ORDER_ID));
        let part_code = collect(&mut violations, fields::PART_CODE, required_code(raw, fields::PART_CODE));
        let machine_code = collect(
            &mut violations,
            fields::MACHINE_CODE,
            required_code(raw, fields::MACHINE_CODE),
        );
        let operator_code = collect(
            &mut violations,
            fields::OPERATOR_CODE,
            required_code(raw, fields::OPERATOR_CODE),
        );
        let started_at = collect(
            &mut violations,
            fields::STARTED_AT,
            self.timestamp(raw, fields::STARTED_AT, now),
        );
        let ended_at = collect(
            &mut violations,
            fields::ENDED_AT,
            self.timestamp(raw, fields::ENDED_AT, now),
        );
        let operation_type = collect(&mut violations, fields::OPERATION_TYPE, operation_type(raw));
        let detail = operation_type.map(|kind| self.detail(raw, kind, &mut violations));
        let reported = collect(&mut violations, fields::ANOMALIES, reported_anomalies(raw)).unwrap_or_default();

        let header = OperationHeader {
            order_id,
            part_code,
            machine_code,
            operator_code,
            started_at,
            ended_at,
        };

        if violations.is_empty() {
            if let Some(op) = normalized(&header, detail.as_ref(), &reported) {
                return Checked::Valid(op);
            }
        }

        Checked::Invalid {
            sanitized: LoadableOperation {
                header,
                detail,
                reported_anomalies: reported,
            },
            violations,
        }
    }

    fn timestamp(&self, raw: &RawRecord, field: &str, now: NaiveDateTime) -> Result<NaiveDateTime, String> {
        match raw.get(field) {
            None => Err("required field is missing".to_string()),
            Some(Value::String(text)) => normalize_at(TimestampInput::Text(text), self.policy.tolerance_minutes, now)
                .map_err(|e| e.to_string()),
            Some(_) => Err("value is not a valid timestamp".to_string()),
        }
    }

    fn detail(&self, raw: &RawRecord, kind: OperationType, violations: &mut Vec<FieldViolation>) -> DetailRow {
        match kind {
            OperationType::Forging => {
                let weight = collect(
                    violations,
                    fields::WEIGHT,
                    required_in_range(raw, fields::WEIGHT, self.policy.weight_min, self.policy.weight_max),
                );
                let temperature = collect(
                    violations,
                    fields::TEMPERATURE,
                    required_in_range(
                        raw,
                        fields::TEMPERATURE,
                        self.policy.temperature_min,
                        self.policy.temperature_max,
                    ),
                );
                DetailRow::Forging { weight, temperature }
            },
            OperationType::Cnc => {
                let pieces_per_hour = collect(violations, fields::PIECES_PER_HOUR, optional_count(raw))
                    .flatten();
                let stop_type = collect(violations, fields::STOP_TYPE, optional_text(raw, fields::STOP_TYPE))
                    .flatten();
                DetailRow::Cnc {
                    pieces_per_hour,
                    stop_type,
                }
            },
        }
    }
}

fn collect<T>(violations: &mut Vec<FieldViolation>, field: &str, outcome: Result<T, String>) -> Option<T> {
    match outcome {
        Ok(value) => Some(value),
        Err(message) => {
            violations.push(FieldViolation::new(field, message));
            None
        },
    }
}

fn normalized(header: &OperationHeader, detail: Option<&DetailRow>, reported: &[i32]) -> Option<NormalizedOperation> {
    let detail = match detail? {
        DetailRow::Forging {
            weight: Some(weight),
            temperature: Some(temperature),
        } => OperationDetail::Forging {
            weight: *weight,
            temperature: *temperature,
        },
        DetailRow::Forging { .. } => return None,
        DetailRow::Cnc {
            pieces_per_hour,
            stop_type,
        } => OperationDetail::Cnc {
            pieces_per_hour: *pieces_per_hour,
            stop_type: stop_type.clone(),
        },
    };

    Some(NormalizedOperation {
        order_id: header.order_id?,
        part_code: header.part_code.clone()?,
        machine_code: header.machine_code.clone()?,
        operator_code: header.operator_code.clone()?,
        started_at: header.started_at?,
        ended_at: header.ended_at?,
        detail,
        reported_anomalies: reported.to_vec(),
    })
}

fn operation_type(raw: &RawRecord) -> Result<OperationType, String> {
    match raw.get(fields::OPERATION_TYPE) {
        None => Err("required field is missing".to_string()),
        Some(Value::String(text)) => text.parse::<OperationType>().map_err(|e| e.to_string()),
        Some(other) => Err(format!("unrecognized operation type '{}'", other)),
    }
}

fn required_code(raw: &RawRecord, field: &str) -> Result<String, String> {
    match raw.get(field) {
        None => Err("required field is missing".to_string()),
        Some(Value::String(text)) if text.trim().is_empty() => Err("value must not be empty".to_string()),
        Some(Value::String(text)) => Ok(text.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err("value must be a string code".to_string()),
    }
}

fn required_integer(raw: &RawRecord, field: &str) -> Result<i64, String> {
    let value = raw.get(field).ok_or_else(|| "required field is missing".to_string())?;
    as_integer(value).ok_or_else(|| format!("value {} is not an integer", value))
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn required_in_range(raw: &RawRecord, field: &str, min: f64, max: f64) -> Result<f64, String> {
    let value = raw.get(field).ok_or_else(|| "required field is missing".to_string())?;
    let number = as_number(value).ok_or_else(|| format!("value {} is not numeric", value))?;

    if number < min || number > max {
        return Err(format!("value {} is outside [{}, {}]", number, min, max));
    }
    Ok(number)
}

fn optional_count(raw: &RawRecord) -> Result<Option<i32>, String> {
    let Some(value) = raw.get(fields::PIECES_PER_HOUR) else {
        return Ok(None);
    };

    let count = as_integer(value).ok_or_else(|| format!("value {} is not an integer", value))?;
    if count < 0 {
        return Err(format!("value {} must not be negative", count));
    }
    i32::try_from(count)
        .map(Some)
        .map_err(|_| format!("value {} is too large", count))
}

fn optional_text(raw: &RawRecord, field: &str) -> Result<Option<String>, String> {
    match raw.get(field) {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(format!("value {} is not a string", other)),
    }
}

/// Anomaly ids declared by the source. The whole list is rejected when any
/// entry lacks an integer `id`.
fn reported_anomalies(raw: &RawRecord) -> Result<Vec<i32>, String> {
    let Some(value) = raw.get(fields::ANOMALIES) else {
        return Ok(Vec::new());
    };
    let Value::Array(entries) = value else {
        return Err("value must be a list of anomaly entries".to_string());
    };

    let mut ids = Vec::with_capacity(entries.len());
    let mut malformed = Vec::new();
    for (position, entry) in entries.iter().enumerate() {
        let id = entry
            .get("id")
            .and_then(as_integer)
            .and_then(|id| i32::try_from(id).ok());
        match id {
            Some(id) => ids.push(id),
            None => malformed.push(position.to_string()),
        }
    }

    if malformed.is_empty() {
        Ok(ids)
    } else {
        Err(format!(
            "entries at positions [{}] carry no valid anomaly id",
            malformed.join(", ")
        ))
    }
}
