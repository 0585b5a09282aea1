use crate::etl::{BatchOrchestrator, BatchRunStatus};

/// Read-only view of the run status
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusQuery;

pub fn handle(orchestrator: &BatchOrchestrator, _query: StatusQuery) -> BatchRunStatus {
    orchestrator.status()
}
