use serde_json::Value;

use crate::etl::{parse_batch, BatchOrchestrator, BatchOutcome, BatchSummary, TriggerError};

#[derive(Debug, thiserror::Error)]
pub enum InsertBatchError {
    #[error(transparent)]
    InvalidInput(#[from] forgeflow_common::ForgeflowError),
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error("{0}")]
    Failed(String),
}

/// Run a batch over the records in `payload` and wait for its outcome
#[tracing::instrument(skip(orchestrator, payload))]
pub async fn handle(orchestrator: &BatchOrchestrator, payload: Value) -> Result<BatchSummary, InsertBatchError> {
    let records = parse_batch(payload)?;

    match orchestrator.run(records).await? {
        BatchOutcome::Success(summary) => Ok(summary),
        BatchOutcome::Failure { error } => Err(InsertBatchError::Failed(error)),
    }
}
