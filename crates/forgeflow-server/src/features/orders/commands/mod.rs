pub mod complete;

pub use complete::{CompleteOrdersCommand, CompleteOrdersError, CompleteOrdersResponse};
