pub mod response;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

use crate::config::{Config, CorsConfig};
use crate::db;
use crate::etl::postgres::PgTargetStore;
use crate::etl::staging::PgStagingSource;
use crate::etl::{BatchOrchestrator, RecordValidator};
use crate::features::{self, FeatureState};
use crate::middleware::{self, ApiKey};

/// Connect the configured pools and wire the orchestrator
pub async fn build_state(config: &Config) -> anyhow::Result<FeatureState> {
    let target = db::create_pool("target", &config.target_db).await?;

    let mut orchestrator = BatchOrchestrator::new(
        Arc::new(PgTargetStore::new(target.clone())),
        RecordValidator::new(config.etl.policy),
    );

    if let Some(staging_config) = &config.staging_db {
        let staging = db::create_pool("staging", staging_config).await?;
        orchestrator =
            orchestrator.with_staging(Arc::new(PgStagingSource::new(staging)), config.etl.staging_mark_attempts);
    }

    Ok(FeatureState {
        db: target,
        orchestrator: Arc::new(orchestrator),
        api_key: ApiKey::new(config.auth.api_key.clone()),
    })
}

/// Create the application router with all routes and middleware
pub fn create_router(state: FeatureState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(state.db.clone())
        .nest("/api/v1", features::router(state))
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

/// Health check handler
async fn health_check(State(pool): State<PgPool>) -> Result<Response, StatusCode> {
    match db::health_check(&pool).await {
        Ok(()) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}
