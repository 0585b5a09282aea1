//! Record shapes flowing through the pipeline
//!
//! A [`RawRecord`] arrives untyped from the ingestion API or the staging
//! table. The validator turns it into a [`NormalizedOperation`] when every
//! rule holds, or into a sanitized [`LoadableOperation`] whose offending
//! fields are nulled out. The load engine only ever sees `LoadableOperation`.

use chrono::NaiveDateTime;
use forgeflow_common::ForgeflowError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::timestamp::format_timestamp;

/// Wire names of the record fields
pub mod fields {
    pub const ORDER_ID: &str = "id_ordine";
    pub const PART_CODE: &str = "codice_pezzo";
    pub const MACHINE_CODE: &str = "codice_macchinario";
    pub const OPERATOR_CODE: &str = "codice_operatore";
    pub const STARTED_AT: &str = "timestamp_inizio";
    pub const ENDED_AT: &str = "timestamp_fine";
    pub const OPERATION_TYPE: &str = "tipo_operazione";
    pub const WEIGHT: &str = "peso_effettivo";
    pub const TEMPERATURE: &str = "temperatura_effettiva";
    pub const PIECES_PER_HOUR: &str = "numero_pezzi_ora";
    pub const STOP_TYPE: &str = "tipo_fermo";
    pub const ANOMALIES: &str = "anomalia";
}

/// Untyped field mapping as received from a source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field value, treating an explicit JSON `null` as absent
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|value| !value.is_null())
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// Build a record from any JSON value.
    ///
    /// Non-object values yield an empty record so the row still flows through
    /// validation and gets annotated instead of being dropped.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Parse a batch payload: a JSON array whose items are all objects
pub fn parse_batch(payload: Value) -> Result<Vec<RawRecord>, ForgeflowError> {
    let Value::Array(items) = payload else {
        return Err(ForgeflowError::invalid_input("records must be a JSON array"));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(map) => Ok(RawRecord(map)),
            _ => Err(ForgeflowError::invalid_input(format!(
                "record at position {} is not a JSON object",
                index
            ))),
        })
        .collect()
}

/// Kind of manufacturing operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    #[serde(rename = "forgiatura")]
    Forging,
    #[serde(rename = "cnc")]
    Cnc,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Forging => "forgiatura",
            OperationType::Cnc => "cnc",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized operation type '{0}'")]
pub struct UnknownOperationType(pub String);

impl FromStr for OperationType {
    type Err = UnknownOperationType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forgiatura" => Ok(OperationType::Forging),
            "cnc" => Ok(OperationType::Cnc),
            other => Err(UnknownOperationType(other.to_string())),
        }
    }
}

/// Validated, type-specific fields
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tipo_operazione")]
pub enum OperationDetail {
    #[serde(rename = "forgiatura")]
    Forging { weight: f64, temperature: f64 },
    #[serde(rename = "cnc")]
    Cnc {
        pieces_per_hour: Option<i32>,
        stop_type: Option<String>,
    },
}

impl OperationDetail {
    pub fn operation_type(&self) -> OperationType {
        match self {
            OperationDetail::Forging { .. } => OperationType::Forging,
            OperationDetail::Cnc { .. } => OperationType::Cnc,
        }
    }
}

/// A record that passed every validation rule. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedOperation {
    pub order_id: i64,
    pub part_code: String,
    pub machine_code: String,
    pub operator_code: String,
    pub started_at: NaiveDateTime,
    pub ended_at: NaiveDateTime,
    pub detail: OperationDetail,
    /// Anomaly ids declared by the source itself in the `anomalia` list
    pub reported_anomalies: Vec<i32>,
}

impl NormalizedOperation {
    pub fn operation_type(&self) -> OperationType {
        self.detail.operation_type()
    }

    /// Render back into the wire shape accepted by the validator
    pub fn to_raw(&self) -> RawRecord {
        let mut raw = RawRecord::new();
        raw.insert(fields::ORDER_ID, self.order_id);
        raw.insert(fields::PART_CODE, self.part_code.clone());
        raw.insert(fields::MACHINE_CODE, self.machine_code.clone());
        raw.insert(fields::OPERATOR_CODE, self.operator_code.clone());
        raw.insert(fields::STARTED_AT, format_timestamp(&self.started_at));
        raw.insert(fields::ENDED_AT, format_timestamp(&self.ended_at));
        raw.insert(fields::OPERATION_TYPE, self.operation_type().as_str());

        match &self.detail {
            OperationDetail::Forging {
                weight,
                temperature,
            } => {
                raw.insert(fields::WEIGHT, *weight);
                raw.insert(fields::TEMPERATURE, *temperature);
            },
            OperationDetail::Cnc {
                pieces_per_hour,
                stop_type,
            } => {
                if let Some(pieces) = pieces_per_hour {
                    raw.insert(fields::PIECES_PER_HOUR, *pieces);
                }
                if let Some(stop) = stop_type {
                    raw.insert(fields::STOP_TYPE, stop.clone());
                }
            },
        }

        if !self.reported_anomalies.is_empty() {
            let entries: Vec<Value> = self
                .reported_anomalies
                .iter()
                .map(|id| serde_json::json!({ "id": id }))
                .collect();
            raw.insert(fields::ANOMALIES, Value::Array(entries));
        }

        raw
    }
}

/// Columns of the `operazioni` row. `None` is written as SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationHeader {
    pub order_id: Option<i64>,
    pub part_code: Option<String>,
    pub machine_code: Option<String>,
    pub operator_code: Option<String>,
    pub started_at: Option<NaiveDateTime>,
    pub ended_at: Option<NaiveDateTime>,
}

/// Columns of the type-specific detail row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DetailRow {
    Forging {
        weight: Option<f64>,
        temperature: Option<f64>,
    },
    Cnc {
        pieces_per_hour: Option<i32>,
        stop_type: Option<String>,
    },
}

/// What the load engine writes: either a normalized operation or a sanitized
/// one whose invalid fields were nulled out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadableOperation {
    pub header: OperationHeader,
    /// `None` when the operation type was not recognized
    pub detail: Option<DetailRow>,
    pub reported_anomalies: Vec<i32>,
}

impl From<NormalizedOperation> for LoadableOperation {
    fn from(op: NormalizedOperation) -> Self {
        let detail = match op.detail {
            OperationDetail::Forging {
                weight,
                temperature,
            } => DetailRow::Forging {
                weight: Some(weight),
                temperature: Some(temperature),
            },
            OperationDetail::Cnc {
                pieces_per_hour,
                stop_type,
            } => DetailRow::Cnc {
                pieces_per_hour,
                stop_type,
            },
        };

        Self {
            header: OperationHeader {
                order_id: Some(op.order_id),
                part_code: Some(op.part_code),
                machine_code: Some(op.machine_code),
                operator_code: Some(op.operator_code),
                started_at: Some(op.started_at),
                ended_at: Some(op.ended_at),
            },
            detail: Some(detail),
            reported_anomalies: op.reported_anomalies,
        }
    }
}

/// One failed rule on one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_fields_read_as_absent() {
        let raw = RawRecord::from_value(json!({ "codice_pezzo": null, "id_ordine": 3 }));
        assert!(raw.get(fields::PART_CODE).is_none());
        assert_eq!(raw.get(fields::ORDER_ID), Some(&json!(3)));
    }

    #[test]
    fn test_parse_batch_requires_array_of_objects() {
        assert_eq!(parse_batch(json!([])).unwrap().len(), 0);
        assert_eq!(parse_batch(json!([{}, { "id_ordine": 1 }])).unwrap().len(), 2);
        assert!(parse_batch(json!({ "id_ordine": 1 })).is_err());

        let err = parse_batch(json!([{}, 5])).unwrap_err();
        assert!(err.to_string().contains("position 1"));
    }

    #[test]
    fn test_operation_type_wire_names() {
        assert_eq!("forgiatura".parse::<OperationType>().unwrap(), OperationType::Forging);
        assert_eq!("cnc".parse::<OperationType>().unwrap(), OperationType::Cnc);
        assert!("CNC".parse::<OperationType>().is_err());
        assert_eq!(serde_json::to_value(OperationType::Forging).unwrap(), json!("forgiatura"));
    }

    #[test]
    fn test_violation_display() {
        let v = FieldViolation::new(fields::WEIGHT, "out of range");
        assert_eq!(v.to_string(), "peso_effettivo: out of range");
    }
}
