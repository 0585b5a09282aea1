pub mod insert;
pub mod trigger;

pub use insert::InsertBatchError;
pub use trigger::{BatchSource, TriggerBatchError, TriggerBatchResponse};
