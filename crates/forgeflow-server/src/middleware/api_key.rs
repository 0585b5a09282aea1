//! Shared-secret check on protected routes

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::AppError;

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct ApiKey(Arc<str>);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(Arc::from(key.into()))
    }

    /// Constant-time comparison against a presented key
    pub fn matches(&self, presented: &[u8]) -> bool {
        self.0.as_bytes().ct_eq(presented).into()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Use with `axum::middleware::from_fn_with_state`
pub async fn require_api_key(State(key): State<ApiKey>, request: Request, next: Next) -> Response {
    let verdict = request
        .headers()
        .get(API_KEY_HEADER)
        .map(|value| key.matches(value.as_bytes()));

    match verdict {
        Some(true) => next.run(request).await,
        Some(false) => {
            tracing::warn!(path = %request.uri().path(), "Rejected request with invalid API key");
            AppError::Unauthorized("invalid API key".to_string()).into_response()
        },
        None => AppError::Unauthorized(format!("missing {} header", API_KEY_HEADER)).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware::from_fn_with_state, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn_with_state(ApiKey::new("secret"), require_api_key))
    }

    async fn status_for(key: Option<&str>) -> StatusCode {
        let mut request = axum::http::Request::builder().uri("/");
        if let Some(key) = key {
            request = request.header(API_KEY_HEADER, key);
        }
        app()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_key_required() {
        assert_eq!(status_for(None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(Some("wrong")).await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(Some("secret")).await, StatusCode::OK);
    }

    #[test]
    fn test_matches_requires_equal_length() {
        let key = ApiKey::new("abc");
        assert!(key.matches(b"abc"));
        assert!(!key.matches(b"abcd"));
        assert!(!key.matches(b"abd"));
    }
}
