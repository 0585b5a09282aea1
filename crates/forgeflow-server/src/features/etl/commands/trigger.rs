use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::etl::{parse_batch, BatchOrchestrator, TriggerError};

#[derive(Debug, Clone, Serialize)]
pub struct TriggerBatchResponse {
    pub accepted: bool,
    /// Number of records in the batch, `None` for staging pulls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
    pub source: BatchSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchSource {
    Request,
    Staging,
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerBatchError {
    #[error(transparent)]
    InvalidInput(#[from] forgeflow_common::ForgeflowError),
    #[error(transparent)]
    Trigger(#[from] TriggerError),
}

/// Start a detached batch over the records in `payload`
#[tracing::instrument(skip(orchestrator, payload))]
pub fn handle(orchestrator: &Arc<BatchOrchestrator>, payload: Value) -> Result<TriggerBatchResponse, TriggerBatchError> {
    let records = parse_batch(payload)?;
    let count = records.len();

    // The handle is dropped; the outcome is observed through the run status
    let _detached = orchestrator.trigger(records)?;

    tracing::info!(records = count, "Batch accepted");

    Ok(TriggerBatchResponse {
        accepted: true,
        records: Some(count),
        source: BatchSource::Request,
    })
}

/// Start a detached batch over the pending staging rows
#[tracing::instrument(skip(orchestrator))]
pub fn handle_staging(orchestrator: &Arc<BatchOrchestrator>) -> Result<TriggerBatchResponse, TriggerBatchError> {
    let _detached = orchestrator.trigger_staging()?;

    tracing::info!("Staging batch accepted");

    Ok(TriggerBatchResponse {
        accepted: true,
        records: None,
        source: BatchSource::Staging,
    })
}
