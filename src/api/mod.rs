//! HTTP API endpoints.

pub mod health;
pub mod inference;
pub mod workflows;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};

use crate::providers::ProviderError;
use crate::AppState;

/// Create the API router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(inference::router())
        .merge(workflows::router())
}

/// Error envelope returned by single-call and workflow endpoints.
///
/// Classified provider errors map to their HTTP status; everything else is
/// an opaque internal error.
#[derive(Debug)]
pub enum ApiError {
    /// A classified provider failure.
    Provider(ProviderError),
    /// Unexpected internal failure.
    Internal(anyhow::Error),
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Provider(err) => {
                let status = err.code.http_status();
                let body = serde_json::json!({
                    "name": "ProviderError",
                    "message": err.message,
                    "service": err.service,
                    "code": err.code,
                });
                (status, Json(body)).into_response()
            }
            Self::Internal(err) => {
                tracing::error!("Internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
