//! Feature modules implementing the Forgeflow API
//!
//! Each feature is a vertical slice with its own commands, queries and routes.
//!
//! - **etl**: batch triggers, inline inserts and run status
//! - **orders**: order completion and pending parts

pub mod etl;
pub mod orders;

use axum::{middleware::from_fn_with_state, Router};
use std::sync::Arc;

use crate::etl::BatchOrchestrator;
use crate::middleware::{require_api_key, ApiKey};

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// Target database pool
    pub db: sqlx::PgPool,
    pub orchestrator: Arc<BatchOrchestrator>,
    pub api_key: ApiKey,
}

/// Creates the `/api/v1` router.
///
/// - `/etl` - pipeline triggers and status
/// - `/orders` - order bookkeeping
///
/// Everything except `GET /etl/status` requires the API key.
pub fn router(state: FeatureState) -> Router<()> {
    let orders = orders::orders_routes()
        .route_layer(from_fn_with_state(state.api_key.clone(), require_api_key))
        .with_state(state.db.clone());

    Router::new()
        .nest("/etl", etl::etl_routes(state.api_key.clone()).with_state(state.orchestrator.clone()))
        .nest("/orders", orders)
}
