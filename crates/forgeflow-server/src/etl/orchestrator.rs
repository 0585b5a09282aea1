//! Batch orchestrator
//!
//! One batch is one unit of work against the target store. Validation
//! failures downgrade a record to an annotated load; any load error rolls
//! the whole batch back.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::anomaly;
use super::loader;
use super::record::{LoadableOperation, RawRecord};
use super::retry::with_retries;
use super::staging::{StagingError, StagingSource};
use super::status::{AlreadyRunning, BatchRunStatus, RunGuard, RunStatusTracker};
use super::store::{LoadError, TargetStore, UnitOfWork};
use super::validator::{Checked, RecordValidator};

/// Default attempts for marking staging rows as processed
pub const DEFAULT_MARK_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Records loaded, clean or annotated
    pub processed: usize,
    /// Records loaded with at least one validation anomaly
    pub annotated: usize,
    /// Anomaly rows written
    pub anomalies: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    Success(BatchSummary),
    Failure { error: String },
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Success(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error("a batch is already running")]
    AlreadyRunning,

    #[error("no staging store is configured")]
    StagingUnavailable,
}

impl From<AlreadyRunning> for TriggerError {
    fn from(_: AlreadyRunning) -> Self {
        TriggerError::AlreadyRunning
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("{0}")]
    Store(#[from] LoadError),

    #[error("record {index}: {source}")]
    Record {
        index: usize,
        #[source]
        source: LoadError,
    },

    #[error("{0}")]
    Staging(#[from] StagingError),
}

enum BatchInput {
    Records(Vec<RawRecord>),
    Staging(Arc<dyn StagingSource>),
}

pub struct BatchOrchestrator {
    store: Arc<dyn TargetStore>,
    staging: Option<Arc<dyn StagingSource>>,
    mark_attempts: u32,
    validator: RecordValidator,
    status: Arc<RunStatusTracker>,
}

impl BatchOrchestrator {
    pub fn new(store: Arc<dyn TargetStore>, validator: RecordValidator) -> Self {
        Self {
            store,
            staging: None,
            mark_attempts: DEFAULT_MARK_ATTEMPTS,
            validator,
            status: Arc::new(RunStatusTracker::new()),
        }
    }

    pub fn with_staging(mut self, source: Arc<dyn StagingSource>, mark_attempts: u32) -> Self {
        self.staging = Some(source);
        self.mark_attempts = mark_attempts;
        self
    }

    pub fn with_status(mut self, status: Arc<RunStatusTracker>) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> BatchRunStatus {
        self.status.snapshot()
    }

    pub fn has_staging(&self) -> bool {
        self.staging.is_some()
    }

    /// Start a batch over `records` on its own task.
    ///
    /// Returns once the batch is marked running; the outcome is also
    /// recorded in the run status.
    pub fn trigger(self: &Arc<Self>, records: Vec<RawRecord>) -> Result<JoinHandle<BatchOutcome>, TriggerError> {
        let guard = self.status.try_start()?;
        Ok(self.spawn(guard, BatchInput::Records(records)))
    }

    /// Start a batch over the pending staging rows on its own task
    pub fn trigger_staging(self: &Arc<Self>) -> Result<JoinHandle<BatchOutcome>, TriggerError> {
        let source = self.staging.clone().ok_or(TriggerError::StagingUnavailable)?;
        let guard = self.status.try_start()?;
        Ok(self.spawn(guard, BatchInput::Staging(source)))
    }

    /// Run a batch over `records` in the caller's task
    pub async fn run(&self, records: Vec<RawRecord>) -> Result<BatchOutcome, TriggerError> {
        let guard = self.status.try_start()?;
        Ok(self.drive(guard, BatchInput::Records(records)).await)
    }

    /// Run a batch over the pending staging rows in the caller's task
    pub async fn run_staging(&self) -> Result<BatchOutcome, TriggerError> {
        let source = self.staging.clone().ok_or(TriggerError::StagingUnavailable)?;
        let guard = self.status.try_start()?;
        Ok(self.drive(guard, BatchInput::Staging(source)).await)
    }

    fn spawn(self: &Arc<Self>, guard: RunGuard, input: BatchInput) -> JoinHandle<BatchOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.drive(guard, input).await })
    }

    async fn drive(&self, guard: RunGuard, input: BatchInput) -> BatchOutcome {
        let batch_id = Uuid::new_v4();
        let span = info_span!("etl_batch", %batch_id);

        let result = async move {
            match input {
                BatchInput::Records(records) => self.execute(&records).await,
                BatchInput::Staging(source) => self.execute_staging(source.as_ref()).await,
            }
        }
        .instrument(span)
        .await;

        match result {
            Ok(summary) => {
                guard.succeed();
                BatchOutcome::Success(summary)
            },
            Err(e) => {
                let message = e.to_string();
                guard.fail(message.clone());
                BatchOutcome::Failure { error: message }
            },
        }
    }

    async fn execute_staging(&self, source: &dyn StagingSource) -> Result<BatchSummary, BatchError> {
        let staged = source.fetch_pending().await?;
        info!(rows = staged.len(), "Pulled pending rows from staging");

        let (ids, records): (Vec<i64>, Vec<RawRecord>) =
            staged.into_iter().map(|row| (row.id, row.record)).unzip();

        let summary = self.execute(&records).await?;

        if !ids.is_empty() {
            let ids = ids.as_slice();
            let marked = with_retries("mark_staging_processed", self.mark_attempts, |_| source.mark_processed(ids)).await?;
            info!(rows = marked, "Staging rows marked as processed");
        }

        Ok(summary)
    }

    async fn execute(&self, records: &[RawRecord]) -> Result<BatchSummary, BatchError> {
        info!(records = records.len(), "Batch started");

        if records.is_empty() {
            info!("Empty batch, nothing to load");
            return Ok(BatchSummary::default());
        }

        let mut unit = self.store.begin().await.map_err(|e| {
            error!(error = %e, "Could not open target transaction");
            e
        })?;

        match self.load_all(unit.as_mut(), records).await {
            Ok(summary) => {
                unit.commit().await?;
                info!(
                    processed = summary.processed,
                    annotated = summary.annotated,
                    anomalies = summary.anomalies,
                    "Batch committed"
                );
                Ok(summary)
            },
            Err(e) => {
                error!(error = %e, "Batch failed, rolling back");
                // Rollback also restores referential checks
                if let Err(rollback_err) = unit.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            },
        }
    }

    async fn load_all(&self, unit: &mut dyn UnitOfWork, records: &[RawRecord]) -> Result<BatchSummary, BatchError> {
        unit.set_referential_checks(false).await?;
        debug!("Referential checks disabled");

        let mut summary = BatchSummary::default();
        for (index, raw) in records.iter().enumerate() {
            self.load_record(unit, raw, &mut summary)
                .await
                .map_err(|source| BatchError::Record { index, source })?;
            summary.processed += 1;
        }

        unit.set_referential_checks(true).await?;
        debug!("Referential checks enabled");

        Ok(summary)
    }

    #[tracing::instrument(name = "record", skip_all, fields(record_index = summary.processed))]
    async fn load_record(
        &self,
        unit: &mut dyn UnitOfWork,
        raw: &RawRecord,
        summary: &mut BatchSummary,
    ) -> Result<(), LoadError> {
        match self.validator.check(raw) {
            Checked::Valid(op) => {
                let anomalies = anomaly::reported(&op.reported_anomalies);
                let order_id = op.order_id;
                let part_code = op.part_code.clone();

                let id = loader::insert(unit, &LoadableOperation::from(op), &anomalies).await?;
                let consumed = unit.consume_order_part(order_id, &part_code).await?;
                if consumed == 0 {
                    debug!(order_id, part_code = %part_code, "No remaining order part to consume");
                }

                summary.anomalies += anomalies.len();
                debug!(operation_id = id, "Record loaded");
            },
            Checked::Invalid { sanitized, violations } => {
                let mut anomalies = anomaly::map(&violations);
                anomalies.extend(anomaly::reported(&sanitized.reported_anomalies));

                let id = loader::insert(unit, &sanitized, &anomalies).await?;

                summary.annotated += 1;
                summary.anomalies += anomalies.len();
                let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
                warn!(operation_id = id, fields = ?fields, "Record loaded with anomalies");
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::memory::{MemoryTargetStore, StoreEvent};
    use serde_json::json;

    fn orchestrator(store: &MemoryTargetStore) -> BatchOrchestrator {
        BatchOrchestrator::new(Arc::new(store.clone()), RecordValidator::default())
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_before_any_record() {
        let store = MemoryTargetStore::new().unavailable();
        let outcome = orchestrator(&store)
            .run(vec![RawRecord::from_value(json!({ "tipo_operazione": "cnc" }))])
            .await
            .unwrap();

        let BatchOutcome::Failure { error } = outcome else {
            panic!("expected failure");
        };
        assert!(error.contains("unavailable"));
        assert!(store.events().is_empty());
    }

    #[tokio::test]
    async fn test_failure_names_the_record() {
        let store = MemoryTargetStore::new().fail_on_operation(1);
        let outcome = orchestrator(&store)
            .run(vec![RawRecord::from_value(json!({ "tipo_operazione": "saldatura" }))])
            .await
            .unwrap();

        assert_eq!(
            outcome,
            BatchOutcome::Failure {
                error: "record 0: constraint violation: operation insert #1 rejected".to_string()
            }
        );
        assert_eq!(
            store.events(),
            vec![StoreEvent::Begin, StoreEvent::ReferentialChecks(false), StoreEvent::Rollback]
        );
    }

    #[tokio::test]
    async fn test_unknown_operation_type_is_annotated_not_fatal() {
        let store = MemoryTargetStore::new();
        let outcome = orchestrator(&store)
            .run(vec![RawRecord::from_value(json!({ "tipo_operazione": "saldatura" }))])
            .await
            .unwrap();

        let BatchOutcome::Success(summary) = outcome else {
            panic!("expected success, got {:?}", outcome);
        };
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.annotated, 1);

        let tables = store.snapshot();
        assert_eq!(tables.operations.len(), 1);
        assert!(tables.forging.is_empty() && tables.cnc.is_empty());
        assert!(tables
            .anomalies
            .iter()
            .any(|a| a.note.starts_with("tipo_operazione: ") && a.code == anomaly::UNKNOWN_ANOMALY_CODE));
    }

    #[tokio::test]
    async fn test_staging_trigger_without_source() {
        let store = MemoryTargetStore::new();
        let orchestrator = Arc::new(orchestrator(&store));
        assert!(!orchestrator.has_staging());
        assert_eq!(orchestrator.trigger_staging().unwrap_err(), TriggerError::StagingUnavailable);
        assert!(!orchestrator.status().running);
    }

    #[test]
    fn test_outcome_wire_shape() {
        let success = serde_json::to_value(BatchOutcome::Success(BatchSummary {
            processed: 2,
            annotated: 1,
            anomalies: 1,
        }))
        .unwrap();
        assert_eq!(
            success,
            json!({ "outcome": "success", "processed": 2, "annotated": 1, "anomalies": 1 })
        );

        let failure = serde_json::to_value(BatchOutcome::Failure { error: "x".into() }).unwrap();
        assert_eq!(failure, json!({ "outcome": "failure", "error": "x" }));
    }
}
