//! Staging source
//!
//! Pending rows live in `raw_operazioni` with a JSONB `payload`. Rows are
//! marked `PROCESSED` only after the target batch has committed.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;

use super::record::RawRecord;

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_PROCESSED: &str = "PROCESSED";

#[derive(Debug, Clone, PartialEq)]
pub struct StagedRecord {
    pub id: i64,
    pub record: RawRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StagingError {
    #[error("staging store unavailable: {0}")]
    Unavailable(String),

    #[error("staging query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for StagingError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StagingError::Unavailable(err.to_string())
            },
            other => StagingError::Query(other.to_string()),
        }
    }
}

#[async_trait]
pub trait StagingSource: Send + Sync {
    /// Every pending row, oldest first
    async fn fetch_pending(&self) -> Result<Vec<StagedRecord>, StagingError>;

    /// Mark rows as processed in one statement. Returns the rows touched.
    async fn mark_processed(&self, ids: &[i64]) -> Result<u64, StagingError>;
}

#[derive(Debug, Clone)]
pub struct PgStagingSource {
    pool: PgPool,
}

impl PgStagingSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StagingSource for PgStagingSource {
    async fn fetch_pending(&self) -> Result<Vec<StagedRecord>, StagingError> {
        let rows: Vec<(i64, Value)> = sqlx::query_as(
            r#"
            SELECT id, payload
            FROM raw_operazioni
            WHERE stato_processo = $1
            ORDER BY id
            "#,
        )
        .bind(STATUS_PENDING)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), "Fetched pending staging rows");

        Ok(rows
            .into_iter()
            .map(|(id, payload)| StagedRecord {
                id,
                record: RawRecord::from_value(payload),
            })
            .collect())
    }

    async fn mark_processed(&self, ids: &[i64]) -> Result<u64, StagingError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE raw_operazioni
            SET stato_processo = $1
            WHERE id = ANY($2)
            "#,
        )
        .bind(STATUS_PROCESSED)
        .bind(ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(result.rows_affected())
    }
}
