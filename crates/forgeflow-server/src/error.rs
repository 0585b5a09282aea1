//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::api::response::ErrorResponse;
use crate::etl::TriggerError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    AlreadyRunning(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Batch failed: {0}")]
    BatchFailed(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Forgeflow error: {0}")]
    Forgeflow(#[from] forgeflow_common::ForgeflowError),
}

pub type ApiResult<T> = Result<T, AppError>;

impl From<TriggerError> for AppError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::AlreadyRunning => AppError::AlreadyRunning(err.to_string()),
            TriggerError::StagingUnavailable => AppError::Unavailable(err.to_string()),
        }
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(err: crate::db::DbError) -> Self {
        match err {
            crate::db::DbError::Sqlx(e) => AppError::Database(e),
            crate::db::DbError::Config(msg) => AppError::Internal(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            },
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            // A concurrent trigger is reported as a client error, not a conflict
            AppError::AlreadyRunning(msg) => (StatusCode::BAD_REQUEST, "ALREADY_RUNNING", msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg),
            AppError::BatchFailed(msg) => {
                tracing::error!("Batch failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "BATCH_FAILED", msg)
            },
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            },
            AppError::Forgeflow(forgeflow_common::ForgeflowError::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg)
            },
            AppError::Forgeflow(e) => {
                tracing::error!("Forgeflow error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.to_string())
            },
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_errors_map_to_status_codes() {
        let response = AppError::from(TriggerError::AlreadyRunning).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AppError::from(TriggerError::StagingUnavailable).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_invalid_input_is_a_client_error() {
        let err = AppError::from(forgeflow_common::ForgeflowError::invalid_input("not an array"));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
