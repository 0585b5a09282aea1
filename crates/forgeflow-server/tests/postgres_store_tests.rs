//! PostgreSQL store integration tests
//!
//! Run with a database available:
//! `DATABASE_URL=postgres://... cargo test --test postgres_store_tests -- --ignored`

use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

use forgeflow_server::etl::postgres::PgTargetStore;
use forgeflow_server::etl::staging::{PgStagingSource, StagingSource, STATUS_PENDING, STATUS_PROCESSED};
use forgeflow_server::etl::{BatchOrchestrator, BatchOutcome, RecordValidator};

mod common;

use common::{cnc_record, forging_record, raw, with_field};

async fn seed_parents(pool: &PgPool) {
    sqlx::query("INSERT INTO ordine (id_ordine) VALUES (7)")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO pezzi (id_pezzo) VALUES ('P1'), ('P2')")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO macchinari (codice_macchinario) VALUES ('M1'), ('M2')")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO operatori (codice_operatore) VALUES ('O1'), ('O2')")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO pezzi_ordine (id_ordine, id_pezzo, quantita_totale, quantita_rimanente) VALUES (7, 'P1', 3, 3)",
    )
    .execute(pool)
    .await
    .unwrap();
}

fn orchestrator(pool: &PgPool) -> BatchOrchestrator {
    BatchOrchestrator::new(Arc::new(PgTargetStore::new(pool.clone())), RecordValidator::default())
}

async fn count(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore] // Requires database
async fn test_batch_writes_every_table(pool: PgPool) {
    seed_parents(&pool).await;

    let overweight = with_field(forging_record(7), "peso_effettivo", json!(1500));
    let records = raw(vec![forging_record(7), cnc_record(7), overweight]);

    let outcome = orchestrator(&pool).run(records).await.unwrap();
    assert!(outcome.is_success(), "{:?}", outcome);

    assert_eq!(count(&pool, "operazioni").await, 3);
    assert_eq!(count(&pool, "forgiatura").await, 2);
    assert_eq!(count(&pool, "cnc").await, 1);

    let anomalies: Vec<(i32, Option<String>)> =
        sqlx::query_as("SELECT id_anomalia, note FROM anomalia_operazione")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].0, 2);

    let null_weights: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM forgiatura WHERE peso_effettivo IS NULL")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(null_weights, 1);

    // Only the clean forging record consumes P1
    let remaining: i32 = sqlx::query_scalar(
        "SELECT quantita_rimanente FROM pezzi_ordine WHERE id_ordine = 7 AND id_pezzo = 'P1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(remaining, 2);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore] // Requires database
async fn test_dangling_reference_rolls_back_batch(pool: PgPool) {
    seed_parents(&pool).await;

    let dangling = with_field(forging_record(7), "codice_pezzo", json!("NOPE"));
    let records = raw(vec![forging_record(7), dangling]);

    let outcome = orchestrator(&pool).run(records).await.unwrap();
    assert!(matches!(outcome, BatchOutcome::Failure { .. }));

    assert_eq!(count(&pool, "operazioni").await, 0);
    assert_eq!(count(&pool, "forgiatura").await, 0);
    let remaining: i32 = sqlx::query_scalar(
        "SELECT quantita_rimanente FROM pezzi_ordine WHERE id_ordine = 7 AND id_pezzo = 'P1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(remaining, 3);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore] // Requires database
async fn test_annotated_record_with_null_references_loads(pool: PgPool) {
    seed_parents(&pool).await;

    let mut record = forging_record(7);
    record.as_object_mut().unwrap().remove("id_ordine");

    let outcome = orchestrator(&pool).run(raw(vec![record])).await.unwrap();
    assert!(outcome.is_success(), "{:?}", outcome);

    let null_orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM operazioni WHERE id_ordine IS NULL")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(null_orders, 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore] // Requires database
async fn test_staging_fetch_and_mark(pool: PgPool) {
    sqlx::query("INSERT INTO raw_operazioni (payload) VALUES ($1), ($2)")
        .bind(forging_record(7))
        .bind(cnc_record(7))
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO raw_operazioni (payload, stato_processo) VALUES ($1, $2)")
        .bind(forging_record(8))
        .bind(STATUS_PROCESSED)
        .execute(&pool)
        .await
        .unwrap();

    let source = PgStagingSource::new(pool.clone());
    let pending = source.fetch_pending().await.unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending[0].id < pending[1].id);
    assert_eq!(
        pending[0].record.get("tipo_operazione"),
        Some(&json!("forgiatura"))
    );

    let ids: Vec<i64> = pending.iter().map(|row| row.id).collect();
    assert_eq!(source.mark_processed(&ids).await.unwrap(), 2);
    assert!(source.fetch_pending().await.unwrap().is_empty());

    let still_pending: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw_operazioni WHERE stato_processo = $1")
        .bind(STATUS_PENDING)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(still_pending, 0);
}
