//! Classified provider error taxonomy.
//!
//! Every upstream failure is classified exactly once, at the failover
//! executor boundary, by matching the raw error message against keyword
//! buckets. The resulting [`ProviderError`] carries the offending provider
//! name, the classified code, and the original cause.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed set of provider error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Upstream throttled the request.
    RateLimited,
    /// Credentials rejected. Fatal: never retried or failed over.
    AuthFailed,
    /// Requested model missing or unavailable.
    ModelUnavailable,
    /// The call or the step exceeded its deadline.
    Timeout,
    /// Malformed request. Fatal: never retried or failed over.
    InvalidRequest,
    /// Unclassified upstream failure.
    ServiceError,
    /// Transport-level failure.
    NetworkError,
}

impl ErrorCode {
    /// Whether the failover executor may try another provider (or the same
    /// provider again) after seeing this code.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::AuthFailed | Self::InvalidRequest)
    }

    /// HTTP status this code maps to at the gateway boundary.
    #[must_use]
    pub fn http_status(self) -> StatusCode {
        match self {
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::AuthFailed => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::ModelUnavailable | Self::Timeout | Self::ServiceError | Self::NetworkError => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    /// Wire representation of the code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "RATE_LIMITED",
            Self::AuthFailed => "AUTH_FAILED",
            Self::ModelUnavailable => "MODEL_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::ServiceError => "SERVICE_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified provider failure.
#[derive(Debug, Error)]
#[error("[{service}] {code}: {message}")]
pub struct ProviderError {
    /// Human-readable message from the underlying failure.
    pub message: String,
    /// Name of the offending provider (or a comma-joined list for a
    /// synthesized all-failed error).
    pub service: String,
    /// Classified error kind.
    pub code: ErrorCode,
    /// Original cause, when one exists.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Result alias for provider-facing operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

impl ProviderError {
    /// Construct an error with an explicit code and no underlying cause.
    pub fn new(service: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            service: service.into(),
            code,
            source: None,
        }
    }

    /// Shorthand for a `SERVICE_ERROR` without a cause.
    pub fn service_error(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(service, ErrorCode::ServiceError, message)
    }

    /// Shorthand for an `INVALID_REQUEST` without a cause.
    pub fn invalid_request(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(service, ErrorCode::InvalidRequest, message)
    }

    /// Synthesized error for an exhausted failover loop: every attempted
    /// provider failed with a retryable error.
    pub fn all_failed(category: &str, attempted: &[String], causes: &[ProviderError]) -> Self {
        let tried = attempted.join(", ");
        let summary = causes
            .iter()
            .map(|e| format!("{} ({})", e.service, e.code))
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            message: format!(
                "All {category} providers failed after {} attempt(s). Tried: {tried}. Causes: {summary}",
                causes.len()
            ),
            service: tried,
            code: ErrorCode::ServiceError,
            source: None,
        }
    }
}

/// Classify a raw error message into an [`ErrorCode`].
///
/// Matching is case-insensitive and the buckets are checked in a fixed
/// order so they stay disjoint.
#[must_use]
pub fn classify_message(message: &str) -> ErrorCode {
    let lower = message.to_lowercase();

    let contains_any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if contains_any(&["rate", "429", "too many requests"]) {
        ErrorCode::RateLimited
    } else if contains_any(&["auth", "401", "unauthorized", "api key", "forbidden"]) {
        ErrorCode::AuthFailed
    } else if contains_any(&["model", "not found", "404"]) {
        ErrorCode::ModelUnavailable
    } else if contains_any(&["timeout", "timed out"]) {
        ErrorCode::Timeout
    } else if contains_any(&["invalid", "400", "bad request"]) {
        ErrorCode::InvalidRequest
    } else if contains_any(&["network", "fetch", "connection refused", "connect", "dns"]) {
        ErrorCode::NetworkError
    } else {
        ErrorCode::ServiceError
    }
}

/// Classify a raw provider failure once, attributing it to `service`.
///
/// The original error is retained as the cause and is never reclassified.
#[must_use]
pub fn classify(service: &str, err: anyhow::Error) -> ProviderError {
    let message = err.to_string();
    let code = classify_message(&message);
    ProviderError {
        message,
        service: service.to_string(),
        code,
        source: Some(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_buckets() {
        assert_eq!(classify_message("Rate limit exceeded"), ErrorCode::RateLimited);
        assert_eq!(classify_message("HTTP 429"), ErrorCode::RateLimited);
        assert_eq!(classify_message("Invalid API key"), ErrorCode::AuthFailed);
        assert_eq!(classify_message("401 Unauthorized"), ErrorCode::AuthFailed);
        assert_eq!(classify_message("model not found"), ErrorCode::ModelUnavailable);
        assert_eq!(classify_message("request timed out"), ErrorCode::Timeout);
        assert_eq!(classify_message("invalid payload"), ErrorCode::InvalidRequest);
        assert_eq!(classify_message("connection refused"), ErrorCode::NetworkError);
        assert_eq!(classify_message("something exploded"), ErrorCode::ServiceError);
    }

    #[test]
    fn test_auth_wins_over_invalid() {
        // "Invalid API key" mentions both buckets; auth is checked first
        // so the fatal credential failure is reported as such.
        assert_eq!(classify_message("Invalid API key"), ErrorCode::AuthFailed);
    }

    #[test]
    fn test_retryable_set() {
        assert!(ErrorCode::RateLimited.is_retryable());
        assert!(ErrorCode::Timeout.is_retryable());
        assert!(ErrorCode::ServiceError.is_retryable());
        assert!(ErrorCode::NetworkError.is_retryable());
        assert!(ErrorCode::ModelUnavailable.is_retryable());
        assert!(!ErrorCode::AuthFailed.is_retryable());
        assert!(!ErrorCode::InvalidRequest.is_retryable());
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ErrorCode::RateLimited.http_status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorCode::AuthFailed.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::InvalidRequest.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Timeout.http_status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorCode::ServiceError.http_status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_classify_keeps_cause() {
        let err = classify("openai", anyhow::anyhow!("rate limit hit"));
        assert_eq!(err.code, ErrorCode::RateLimited);
        assert_eq!(err.service, "openai");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_all_failed_lists_attempted() {
        let causes = vec![
            ProviderError::new("a", ErrorCode::RateLimited, "rate"),
            ProviderError::new("b", ErrorCode::Timeout, "slow"),
        ];
        let attempted = vec!["a".to_string(), "b".to_string()];
        let err = ProviderError::all_failed("text", &attempted, &causes);
        assert_eq!(err.code, ErrorCode::ServiceError);
        assert_eq!(err.service, "a, b");
        assert!(err.message.contains("a, b"));
        assert!(err.message.contains("RATE_LIMITED"));
    }

    #[test]
    fn test_code_serde_wire_format() {
        let json = serde_json::to_string(&ErrorCode::RateLimited).unwrap();
        assert_eq!(json, "\"RATE_LIMITED\"");
        let back: ErrorCode = serde_json::from_str("\"AUTH_FAILED\"").unwrap();
        assert_eq!(back, ErrorCode::AuthFailed);
    }
}
