use serde::{Deserialize, Serialize};
use sqlx::PgPool;

pub const STATUS_WAITING: &str = "IN ATTESA";
pub const STATUS_COMPLETED: &str = "COMPLETATO";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteOrdersCommand;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteOrdersResponse {
    pub completed: Vec<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum CompleteOrdersError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Close every waiting order with no part left to produce
#[tracing::instrument(skip(pool))]
pub async fn handle(
    pool: PgPool,
    _command: CompleteOrdersCommand,
) -> Result<CompleteOrdersResponse, CompleteOrdersError> {
    let mut tx = pool.begin().await?;

    let completed: Vec<i64> = sqlx::query_scalar(
        r#"
        UPDATE ordine o
        SET stato = $1, data_fine = CURRENT_DATE
        WHERE o.stato = $2
          AND NOT EXISTS (
              SELECT 1 FROM pezzi_ordine po
              WHERE po.id_ordine = o.id_ordine AND po.quantita_rimanente > 0
          )
        RETURNING o.id_ordine
        "#,
    )
    .bind(STATUS_COMPLETED)
    .bind(STATUS_WAITING)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(count = completed.len(), "Orders completed");

    Ok(CompleteOrdersResponse { completed })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(pool: &PgPool) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ordine (id_ordine, stato) VALUES
                (1, 'IN ATTESA'), (2, 'IN ATTESA'), (3, 'IN ATTESA'), (4, 'COMPLETATO')
            "#,
        )
        .execute(pool)
        .await?;
        sqlx::query("INSERT INTO pezzi (id_pezzo) VALUES ('P1'), ('P2')")
            .execute(pool)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO pezzi_ordine (id_ordine, id_pezzo, quantita_totale, quantita_rimanente) VALUES
                (1, 'P1', 2, 0), (1, 'P2', 1, 0), (2, 'P1', 3, 1)
            "#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    #[ignore] // Requires database
    async fn test_completes_orders_without_remaining_parts(pool: PgPool) -> sqlx::Result<()> {
        seed(&pool).await?;

        let mut response = handle(pool.clone(), CompleteOrdersCommand).await.unwrap();
        response.completed.sort();
        // Order 3 has no parts at all
        assert_eq!(response.completed, vec![1, 3]);

        let state: String = sqlx::query_scalar("SELECT stato FROM ordine WHERE id_ordine = 2")
            .fetch_one(&pool)
            .await?;
        assert_eq!(state, STATUS_WAITING);

        let again = handle(pool.clone(), CompleteOrdersCommand).await.unwrap();
        assert!(again.completed.is_empty());
        Ok(())
    }
}
