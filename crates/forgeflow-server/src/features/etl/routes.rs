//! Pipeline API routes
//!
//! - `POST /api/v1/etl/run` - Start a detached batch over the posted records
//! - `POST /api/v1/etl/insert` - Run a batch inline and return its summary
//! - `POST /api/v1/etl/staging/run` - Start a detached batch over pending staging rows
//! - `GET /api/v1/etl/status` - Current run status
//!
//! All but `status` require the `X-API-KEY` header.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;

use super::commands::{InsertBatchError, TriggerBatchError};
use super::queries::StatusQuery;
use crate::api::response::ApiResponse;
use crate::error::AppError;
use crate::etl::BatchOrchestrator;
use crate::middleware::{require_api_key, ApiKey};

pub type EtlState = Arc<BatchOrchestrator>;

pub fn etl_routes(api_key: ApiKey) -> Router<EtlState> {
    Router::new()
        .route("/run", post(trigger_batch))
        .route("/insert", post(insert_batch))
        .route("/staging/run", post(trigger_staging))
        .route_layer(from_fn_with_state(api_key, require_api_key))
        .route("/status", get(get_status))
}

fn body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// `202 Accepted` once the batch is running, `400` when one already is or
/// the body is not a JSON array of objects
#[tracing::instrument(skip(orchestrator, payload))]
async fn trigger_batch(
    State(orchestrator): State<EtlState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let response = super::commands::trigger::handle(&orchestrator, body(payload)?)?;
    Ok(ApiResponse::success(response).with_status(StatusCode::ACCEPTED))
}

#[tracing::instrument(skip(orchestrator, payload))]
async fn insert_batch(
    State(orchestrator): State<EtlState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let summary = super::commands::insert::handle(&orchestrator, body(payload)?).await?;
    Ok(ApiResponse::success(summary).into_response())
}

#[tracing::instrument(skip(orchestrator))]
async fn trigger_staging(State(orchestrator): State<EtlState>) -> Result<Response, AppError> {
    let response = super::commands::trigger::handle_staging(&orchestrator)?;
    Ok(ApiResponse::success(response).with_status(StatusCode::ACCEPTED))
}

async fn get_status(State(orchestrator): State<EtlState>) -> impl IntoResponse {
    Json(super::queries::status::handle(&orchestrator, StatusQuery))
}

impl From<TriggerBatchError> for AppError {
    fn from(err: TriggerBatchError) -> Self {
        match err {
            TriggerBatchError::InvalidInput(e) => AppError::Forgeflow(e),
            TriggerBatchError::Trigger(e) => AppError::from(e),
        }
    }
}

impl From<InsertBatchError> for AppError {
    fn from(err: InsertBatchError) -> Self {
        match err {
            InsertBatchError::InvalidInput(e) => AppError::Forgeflow(e),
            InsertBatchError::Trigger(e) => AppError::from(e),
            InsertBatchError::Failed(message) => AppError::BatchFailed(message),
        }
    }
}
