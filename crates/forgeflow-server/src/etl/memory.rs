//! In-memory target store
//!
//! Backs dry runs of the CLI and the pipeline tests. A unit of work edits a
//! private copy of the committed tables and publishes it on commit, so rolled
//! back batches leave no trace.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::anomaly::Anomaly;
use super::record::OperationHeader;
use super::store::{LoadError, OperationId, TargetStore, UnitOfWork};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredOperation {
    pub id: OperationId,
    pub header: OperationHeader,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredForging {
    pub operation_id: OperationId,
    pub weight: Option<f64>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredCnc {
    pub operation_id: OperationId,
    pub pieces_per_hour: Option<i32>,
    pub stop_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredAnomaly {
    pub operation_id: OperationId,
    pub code: i32,
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTables {
    pub operations: Vec<StoredOperation>,
    pub forging: Vec<StoredForging>,
    pub cnc: Vec<StoredCnc>,
    pub anomalies: Vec<StoredAnomaly>,
    /// Remaining quantity per `(id_ordine, id_pezzo)`
    pub order_parts: BTreeMap<(i64, String), i64>,
    next_id: OperationId,
}

impl MemoryTables {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.forging.is_empty() && self.cnc.is_empty() && self.anomalies.is_empty()
    }

    pub fn anomalies_for(&self, id: OperationId) -> Vec<&StoredAnomaly> {
        self.anomalies.iter().filter(|a| a.operation_id == id).collect()
    }
}

/// Transaction-level events, in the order they happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    Begin,
    ReferentialChecks(bool),
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
struct Shared {
    committed: MemoryTables,
    events: Vec<StoreEvent>,
    checks_deferred: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTargetStore {
    shared: Arc<Mutex<Shared>>,
    fail_on_operation: Option<usize>,
    unavailable: bool,
}

impl MemoryTargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an order part with its remaining quantity
    pub fn with_order_part(self, order_id: i64, part_code: &str, remaining: i64) -> Self {
        lock(&self.shared)
            .committed
            .order_parts
            .insert((order_id, part_code.to_string()), remaining);
        self
    }

    /// Make the `n`-th operation insert of a unit of work fail with a
    /// constraint violation (1-based)
    pub fn fail_on_operation(mut self, n: usize) -> Self {
        self.fail_on_operation = Some(n);
        self
    }

    /// Refuse to open units of work, as when the database is unreachable
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn snapshot(&self) -> MemoryTables {
        lock(&self.shared).committed.clone()
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        lock(&self.shared).events.clone()
    }

    /// Whether referential checks are currently enforced
    pub fn referential_checks_enforced(&self) -> bool {
        !lock(&self.shared).checks_deferred
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl TargetStore for MemoryTargetStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LoadError> {
        if self.unavailable {
            return Err(LoadError::Connection("target store is unavailable".to_string()));
        }

        let working = {
            let mut shared = lock(&self.shared);
            shared.events.push(StoreEvent::Begin);
            shared.committed.clone()
        };

        Ok(Box::new(MemoryUnitOfWork {
            shared: Arc::clone(&self.shared),
            working,
            inserted: 0,
            fail_on_operation: self.fail_on_operation,
        }))
    }
}

struct MemoryUnitOfWork {
    shared: Arc<Mutex<Shared>>,
    working: MemoryTables,
    inserted: usize,
    fail_on_operation: Option<usize>,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn set_referential_checks(&mut self, enabled: bool) -> Result<(), LoadError> {
        let mut shared = lock(&self.shared);
        shared.checks_deferred = !enabled;
        shared.events.push(StoreEvent::ReferentialChecks(enabled));
        Ok(())
    }

    async fn insert_operation(&mut self, header: &OperationHeader) -> Result<OperationId, LoadError> {
        self.inserted += 1;
        if self.fail_on_operation == Some(self.inserted) {
            return Err(LoadError::Constraint(format!(
                "operation insert #{} rejected",
                self.inserted
            )));
        }

        self.working.next_id += 1;
        let id = self.working.next_id;
        self.working.operations.push(StoredOperation {
            id,
            header: header.clone(),
        });
        Ok(id)
    }

    async fn insert_forging(
        &mut self,
        id: OperationId,
        weight: Option<f64>,
        temperature: Option<f64>,
    ) -> Result<(), LoadError> {
        self.working.forging.push(StoredForging {
            operation_id: id,
            weight,
            temperature,
        });
        Ok(())
    }

    async fn insert_cnc(
        &mut self,
        id: OperationId,
        pieces_per_hour: Option<i32>,
        stop_type: Option<&str>,
    ) -> Result<(), LoadError> {
        self.working.cnc.push(StoredCnc {
            operation_id: id,
            pieces_per_hour,
            stop_type: stop_type.map(str::to_string),
        });
        Ok(())
    }

    async fn insert_anomaly(&mut self, id: OperationId, anomaly: &Anomaly) -> Result<(), LoadError> {
        if !self.working.operations.iter().any(|op| op.id == id) {
            return Err(LoadError::Constraint(format!("operation {} does not exist", id)));
        }
        self.working.anomalies.push(StoredAnomaly {
            operation_id: id,
            code: anomaly.code,
            note: anomaly.note.clone(),
        });
        Ok(())
    }

    async fn consume_order_part(&mut self, order_id: i64, part_code: &str) -> Result<u64, LoadError> {
        match self
            .working
            .order_parts
            .get_mut(&(order_id, part_code.to_string()))
        {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Ok(1)
            },
            _ => Ok(0),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), LoadError> {
        let MemoryUnitOfWork { shared: handle, working, .. } = *self;
        let mut shared = lock(&handle);
        shared.committed = working;
        shared.checks_deferred = false;
        shared.events.push(StoreEvent::Commit);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LoadError> {
        let mut shared = lock(&self.shared);
        shared.checks_deferred = false;
        shared.events.push(StoreEvent::Rollback);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_publishes_and_rollback_discards() {
        let store = MemoryTargetStore::new();

        let mut unit = store.begin().await.unwrap();
        let id = unit.insert_operation(&OperationHeader::default()).await.unwrap();
        unit.insert_forging(id, Some(1.0), None).await.unwrap();
        unit.rollback().await.unwrap();
        assert!(store.snapshot().is_empty());

        let mut unit = store.begin().await.unwrap();
        unit.insert_operation(&OperationHeader::default()).await.unwrap();
        unit.commit().await.unwrap();
        assert_eq!(store.snapshot().operations.len(), 1);
    }

    #[tokio::test]
    async fn test_order_part_never_goes_negative() {
        let store = MemoryTargetStore::new().with_order_part(7, "P1", 1);

        let mut unit = store.begin().await.unwrap();
        assert_eq!(unit.consume_order_part(7, "P1").await.unwrap(), 1);
        assert_eq!(unit.consume_order_part(7, "P1").await.unwrap(), 0);
        assert_eq!(unit.consume_order_part(8, "P1").await.unwrap(), 0);
        unit.commit().await.unwrap();

        assert_eq!(store.snapshot().order_parts[&(7, "P1".to_string())], 0);
    }

    #[tokio::test]
    async fn test_rollback_restores_referential_checks() {
        let store = MemoryTargetStore::new();

        let mut unit = store.begin().await.unwrap();
        unit.set_referential_checks(false).await.unwrap();
        assert!(!store.referential_checks_enforced());
        unit.rollback().await.unwrap();

        assert!(store.referential_checks_enforced());
    }

    #[tokio::test]
    async fn test_unavailable_store_refuses_to_begin() {
        let store = MemoryTargetStore::new().unavailable();
        assert!(matches!(store.begin().await, Err(LoadError::Connection(_))));
    }
}
