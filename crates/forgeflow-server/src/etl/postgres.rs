//! Postgres target store
//!
//! Foreign keys of the target schema are declared `DEFERRABLE`, so disabling
//! referential checks defers them to the end of the transaction and enabling
//! them again forces the pending checks to run before commit.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::anomaly::Anomaly;
use super::record::OperationHeader;
use super::store::{LoadError, OperationId, TargetStore, UnitOfWork};

#[derive(Debug, Clone)]
pub struct PgTargetStore {
    pool: PgPool,
}

impl PgTargetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TargetStore for PgTargetStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LoadError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LoadError::Connection(e.to_string()))?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn set_referential_checks(&mut self, enabled: bool) -> Result<(), LoadError> {
        let statement = if enabled {
            "SET CONSTRAINTS ALL IMMEDIATE"
        } else {
            "SET CONSTRAINTS ALL DEFERRED"
        };
        sqlx::query(statement).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn insert_operation(&mut self, header: &OperationHeader) -> Result<OperationId, LoadError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO operazioni (
                id_ordine, codice_pezzo, codice_macchinario, codice_operatore,
                timestamp_inizio, timestamp_fine
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id_operazione
            "#,
        )
        .bind(header.order_id)
        .bind(header.part_code.as_deref())
        .bind(header.machine_code.as_deref())
        .bind(header.operator_code.as_deref())
        .bind(header.started_at)
        .bind(header.ended_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn insert_forging(
        &mut self,
        id: OperationId,
        weight: Option<f64>,
        temperature: Option<f64>,
    ) -> Result<(), LoadError> {
        sqlx::query(
            r#"
            INSERT INTO forgiatura (id_operazione, peso_effettivo, temperatura_effettiva)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(id)
        .bind(weight)
        .bind(temperature)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_cnc(
        &mut self,
        id: OperationId,
        pieces_per_hour: Option<i32>,
        stop_type: Option<&str>,
    ) -> Result<(), LoadError> {
        sqlx::query(
            r#"
            INSERT INTO cnc (id_operazione, numero_pezzi_ora, tipo_fermo)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(id)
        .bind(pieces_per_hour)
        .bind(stop_type)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_anomaly(&mut self, id: OperationId, anomaly: &Anomaly) -> Result<(), LoadError> {
        sqlx::query(
            r#"
            INSERT INTO anomalia_operazione (id_anomalia, id_operazione, note)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(anomaly.code)
        .bind(id)
        .bind(&anomaly.note)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn consume_order_part(&mut self, order_id: i64, part_code: &str) -> Result<u64, LoadError> {
        let result = sqlx::query(
            r#"
            UPDATE pezzi_ordine
            SET quantita_rimanente = quantita_rimanente - 1
            WHERE id_ordine = $1 AND id_pezzo = $2 AND quantita_rimanente > 0
            "#,
        )
        .bind(order_id)
        .bind(part_code)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), LoadError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LoadError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
