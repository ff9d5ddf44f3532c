//! Bearer authentication middleware.
//!
//! A single static key is checked on every route except `GET /`. When no
//! key is configured, authentication is disabled.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::AUTHORIZATION, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::AppState;

/// Authentication error response.
#[derive(Debug, Serialize)]
pub struct AuthError {
    pub error: String,
    pub message: String,
}

impl AuthError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            error: "unauthorized".to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(self)).into_response()
    }
}

/// Middleware validating the bearer key on every route except `GET /`.
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    if req.method() == Method::GET && req.uri().path() == "/" {
        return Ok(next.run(req).await);
    }

    let Some(expected) = state.config.gateway.api_key.as_deref() else {
        // No key configured: auth is disabled.
        return Ok(next.run(req).await);
    };

    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AuthError::new("Missing Authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::new("Authorization header must use the Bearer scheme"))?;

    if token != expected {
        tracing::debug!(path = %req.uri().path(), "Rejected request with invalid API key");
        return Err(AuthError::new("Invalid API key"));
    }

    Ok(next.run(req).await)
}
