//! Validate-transform-load pipeline for forging and CNC operation records

pub mod anomaly;
pub mod loader;
pub mod memory;
pub mod orchestrator;
pub mod postgres;
pub mod record;
pub mod retry;
pub mod staging;
pub mod status;
pub mod store;
pub mod timestamp;
pub mod validator;

pub use orchestrator::{BatchOrchestrator, BatchOutcome, BatchSummary, TriggerError};
pub use record::{parse_batch, RawRecord};
pub use status::{BatchRunStatus, RunStatusTracker};
pub use store::{LoadError, TargetStore, UnitOfWork};
pub use validator::{RecordValidator, ValidationPolicy};
