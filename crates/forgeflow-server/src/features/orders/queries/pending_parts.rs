use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::features::orders::commands::complete::STATUS_WAITING;

pub const DEFAULT_LIMIT: i64 = 5;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingPartsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingPart {
    #[sqlx(rename = "id_ordine")]
    pub order_id: i64,
    #[sqlx(rename = "id_pezzo")]
    pub part_code: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PendingPartsError {
    #[error("Limit must be between 1 and 100")]
    InvalidLimit,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl PendingPartsQuery {
    pub fn validate(&self) -> Result<(), PendingPartsError> {
        match self.limit {
            Some(limit) if !(1..=MAX_LIMIT).contains(&limit) => Err(PendingPartsError::InvalidLimit),
            _ => Ok(()),
        }
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

/// Order parts still to be produced for waiting orders
#[tracing::instrument(skip(pool))]
pub async fn handle(pool: PgPool, query: PendingPartsQuery) -> Result<Vec<PendingPart>, PendingPartsError> {
    query.validate()?;

    let parts = sqlx::query_as::<_, PendingPart>(
        r#"
        SELECT po.id_ordine, po.id_pezzo
        FROM pezzi_ordine po
        JOIN ordine o ON o.id_ordine = po.id_ordine
        WHERE o.stato = $1
          AND po.quantita_rimanente > 0
          AND po.quantita_rimanente <= po.quantita_totale
        ORDER BY po.id_ordine, po.id_pezzo
        LIMIT $2
        "#,
    )
    .bind(STATUS_WAITING)
    .bind(query.limit())
    .fetch_all(&pool)
    .await?;

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_bounds() {
        assert!(PendingPartsQuery { limit: None }.validate().is_ok());
        assert_eq!(PendingPartsQuery { limit: None }.limit(), DEFAULT_LIMIT);
        assert!(PendingPartsQuery { limit: Some(100) }.validate().is_ok());
        assert!(matches!(
            PendingPartsQuery { limit: Some(0) }.validate(),
            Err(PendingPartsError::InvalidLimit)
        ));
        assert!(PendingPartsQuery { limit: Some(101) }.validate().is_err());
    }

    #[sqlx::test(migrations = "../../migrations")]
    #[ignore] // Requires database
    async fn test_lists_waiting_parts_in_order(pool: PgPool) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO ordine (id_ordine, stato) VALUES (2, 'IN ATTESA'), (1, 'IN ATTESA'), (3, 'COMPLETATO')")
            .execute(&pool)
            .await?;
        sqlx::query("INSERT INTO pezzi (id_pezzo) VALUES ('P1'), ('P2')")
            .execute(&pool)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO pezzi_ordine (id_ordine, id_pezzo, quantita_totale, quantita_rimanente) VALUES
                (2, 'P1', 3, 2), (1, 'P2', 1, 1), (1, 'P1', 1, 0), (3, 'P1', 5, 5)
            "#,
        )
        .execute(&pool)
        .await?;

        let parts = handle(pool.clone(), PendingPartsQuery::default()).await.unwrap();
        assert_eq!(
            parts,
            vec![
                PendingPart {
                    order_id: 1,
                    part_code: "P2".to_string()
                },
                PendingPart {
                    order_id: 2,
                    part_code: "P1".to_string()
                },
            ]
        );
        Ok(())
    }
}
