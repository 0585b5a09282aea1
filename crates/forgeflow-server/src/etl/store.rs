//! Target store interface
//!
//! A [`TargetStore`] opens one [`UnitOfWork`] per batch. The unit of work holds
//! the batch transaction; only the orchestrator commits or rolls it back.

use async_trait::async_trait;
use thiserror::Error;

use super::anomaly::Anomaly;
use super::record::OperationHeader;

/// Identifier assigned to an `operazioni` row by the target store
pub type OperationId = i64;

pub const SQLSTATE_NOT_NULL_VIOLATION: &str = "23502";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("unrecognized operation type")]
    UnrecognizedOperationType,

    /// Bad input reached the database: NOT NULL, foreign key or unique rule
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("connection error: {0}")]
    Connection(String),
}

impl From<sqlx::Error> for LoadError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                let not_null = db.code().as_deref() == Some(SQLSTATE_NOT_NULL_VIOLATION);
                if not_null || db.is_foreign_key_violation() || db.is_unique_violation() || db.is_check_violation() {
                    LoadError::Constraint(db.message().to_string())
                } else {
                    LoadError::Database(db.message().to_string())
                }
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => LoadError::Connection(err.to_string()),
            _ => LoadError::Database(err.to_string()),
        }
    }
}

#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Open the batch transaction
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LoadError>;
}

/// Writes performed inside one batch transaction
#[async_trait]
pub trait UnitOfWork: Send {
    /// Toggle referential-integrity enforcement for the rest of the batch.
    /// The setting is scoped to the unit of work.
    async fn set_referential_checks(&mut self, enabled: bool) -> Result<(), LoadError>;

    async fn insert_operation(&mut self, header: &OperationHeader) -> Result<OperationId, LoadError>;

    async fn insert_forging(
        &mut self,
        id: OperationId,
        weight: Option<f64>,
        temperature: Option<f64>,
    ) -> Result<(), LoadError>;

    async fn insert_cnc(
        &mut self,
        id: OperationId,
        pieces_per_hour: Option<i32>,
        stop_type: Option<&str>,
    ) -> Result<(), LoadError>;

    async fn insert_anomaly(&mut self, id: OperationId, anomaly: &Anomaly) -> Result<(), LoadError>;

    /// Decrement the remaining quantity of one order part, never below zero.
    /// Returns the number of rows touched.
    async fn consume_order_part(&mut self, order_id: i64, part_code: &str) -> Result<u64, LoadError>;

    async fn commit(self: Box<Self>) -> Result<(), LoadError>;

    /// Discard every write of the unit of work. Referential checks disabled
    /// with [`UnitOfWork::set_referential_checks`] are enforced again
    /// afterwards; callers do not re-enable them on the failure path.
    async fn rollback(self: Box<Self>) -> Result<(), LoadError>;
}
