//! Load engine
//!
//! Writes one operation, its detail row and its anomaly rows through the
//! caller's unit of work. Never commits.
//!
//! An operation whose type failed validation has no detail row; it is written
//! with its anomalies only. Without that anomaly a missing detail is an error.

use tracing::debug;

use super::anomaly::Anomaly;
use super::record::{fields, DetailRow, LoadableOperation};
use super::store::{LoadError, OperationId, UnitOfWork};

pub async fn insert(
    unit: &mut dyn UnitOfWork,
    operation: &LoadableOperation,
    anomalies: &[Anomaly],
) -> Result<OperationId, LoadError> {
    let type_flagged = anomalies.iter().any(|a| a.field == fields::OPERATION_TYPE);
    if operation.detail.is_none() && !type_flagged {
        return Err(LoadError::UnrecognizedOperationType);
    }

    let id = unit.insert_operation(&operation.header).await?;

    match &operation.detail {
        Some(DetailRow::Forging { weight, temperature }) => {
            unit.insert_forging(id, *weight, *temperature).await?;
        },
        Some(DetailRow::Cnc {
            pieces_per_hour,
            stop_type,
        }) => {
            unit.insert_cnc(id, *pieces_per_hour, stop_type.as_deref()).await?;
        },
        None => debug!(operation_id = id, "Operation type unknown, no detail row"),
    }

    for anomaly in anomalies {
        unit.insert_anomaly(id, anomaly).await?;
    }

    debug!(operation_id = id, anomalies = anomalies.len(), "Operation loaded");

    Ok(id)
}
