//! Order API routes
//!
//! - `POST /api/v1/orders/complete` - Close waiting orders with no parts left
//! - `GET /api/v1/orders/pending-parts?limit=N` - Parts still to produce

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use sqlx::PgPool;

use super::commands::{CompleteOrdersCommand, CompleteOrdersError};
use super::queries::{PendingPartsError, PendingPartsQuery};
use crate::api::response::ApiResponse;
use crate::error::AppError;

pub fn orders_routes() -> Router<PgPool> {
    Router::new()
        .route("/complete", post(complete_orders))
        .route("/pending-parts", get(pending_parts))
}

#[tracing::instrument(skip(pool))]
async fn complete_orders(State(pool): State<PgPool>) -> Result<Response, AppError> {
    let response = super::commands::complete::handle(pool, CompleteOrdersCommand).await?;
    Ok(ApiResponse::success(response).into_response())
}

#[tracing::instrument(skip(pool))]
async fn pending_parts(
    State(pool): State<PgPool>,
    Query(query): Query<PendingPartsQuery>,
) -> Result<Response, AppError> {
    let parts = super::queries::pending_parts::handle(pool, query).await?;
    Ok(ApiResponse::success(parts).into_response())
}

impl From<CompleteOrdersError> for AppError {
    fn from(err: CompleteOrdersError) -> Self {
        match err {
            CompleteOrdersError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<PendingPartsError> for AppError {
    fn from(err: PendingPartsError) -> Self {
        match err {
            PendingPartsError::InvalidLimit => AppError::BadRequest(err.to_string()),
            PendingPartsError::Database(e) => AppError::Database(e),
        }
    }
}
