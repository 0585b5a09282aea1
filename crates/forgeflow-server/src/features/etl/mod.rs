pub mod commands;
pub mod queries;
pub mod routes;

pub use commands::{BatchSource, InsertBatchError, TriggerBatchError, TriggerBatchResponse};
pub use queries::StatusQuery;
pub use routes::{etl_routes, EtlState};
