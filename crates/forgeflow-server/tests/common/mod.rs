//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use forgeflow_server::etl::record::RawRecord;
use forgeflow_server::etl::staging::{StagedRecord, StagingError, StagingSource};

/// A forging record that passes every rule
pub fn forging_record(order_id: i64) -> Value {
    json!({
        "tipo_operazione": "forgiatura",
        "peso_effettivo": 500,
        "temperatura_effettiva": 900,
        "timestamp_inizio": "2024-01-01 10:00:00",
        "timestamp_fine": "2024-01-01 10:05:00",
        "id_ordine": order_id,
        "codice_pezzo": "P1",
        "codice_macchinario": "M1",
        "codice_operatore": "O1"
    })
}

/// A CNC record that passes every rule
pub fn cnc_record(order_id: i64) -> Value {
    json!({
        "tipo_operazione": "cnc",
        "numero_pezzi_ora": 40,
        "tipo_fermo": "manutenzione",
        "timestamp_inizio": "2024-01-01 11:00:00",
        "timestamp_fine": "2024-01-01 11:30:00.250000",
        "id_ordine": order_id,
        "codice_pezzo": "P2",
        "codice_macchinario": "M2",
        "codice_operatore": "O2"
    })
}

/// Timestamp text `minutes` from now
pub fn from_now(minutes: i64) -> String {
    (Utc::now().naive_utc() + Duration::minutes(minutes))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

pub fn with_field(mut record: Value, field: &str, value: Value) -> Value {
    record[field] = value;
    record
}

pub fn raw(values: Vec<Value>) -> Vec<RawRecord> {
    values.into_iter().map(RawRecord::from_value).collect()
}

/// Staging source kept in memory
#[derive(Default)]
pub struct MemoryStagingSource {
    rows: Mutex<Vec<(StagedRecord, bool)>>,
    fail_marks: AtomicU32,
    mark_calls: AtomicU32,
    unavailable: bool,
}

impl MemoryStagingSource {
    pub fn with_rows(records: Vec<Value>) -> Self {
        let rows = records
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                (
                    StagedRecord {
                        id: i as i64 + 1,
                        record: RawRecord::from_value(value),
                    },
                    false,
                )
            })
            .collect();
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Make the next `n` mark attempts fail
    pub fn failing_marks(self, n: u32) -> Self {
        self.fail_marks.store(n, Ordering::SeqCst);
        self
    }

    pub fn processed_ids(&self) -> Vec<i64> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, processed)| *processed)
            .map(|(row, _)| row.id)
            .collect()
    }

    pub fn mark_calls(&self) -> u32 {
        self.mark_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StagingSource for MemoryStagingSource {
    async fn fetch_pending(&self) -> Result<Vec<StagedRecord>, StagingError> {
        if self.unavailable {
            return Err(StagingError::Unavailable("connection refused".to_string()));
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, processed)| !processed)
            .map(|(row, _)| row.clone())
            .collect())
    }

    async fn mark_processed(&self, ids: &[i64]) -> Result<u64, StagingError> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_marks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StagingError::Query("deadlock detected".to_string()));
        }

        let mut rows = self.rows.lock().unwrap();
        let mut marked = 0;
        for (row, processed) in rows.iter_mut() {
            if ids.contains(&row.id) && !*processed {
                *processed = true;
                marked += 1;
            }
        }
        Ok(marked)
    }
}
