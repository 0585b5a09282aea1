pub mod pending_parts;

pub use pending_parts::{PendingPart, PendingPartsError, PendingPartsQuery};
