pub mod commands;
pub mod queries;
pub mod routes;

pub use commands::{CompleteOrdersCommand, CompleteOrdersError, CompleteOrdersResponse};
pub use queries::{PendingPart, PendingPartsError, PendingPartsQuery};
pub use routes::orders_routes;
