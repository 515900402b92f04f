//! Request-level error taxonomy.
//!
//! # Mapping
//! ```text
//! AuthFailure          → 401, never retried
//! PermissionDenied     → 403
//! InvalidRequest       → 400
//! NoBackendAvailable   → 503, retry budget already spent finding a candidate
//! Configuration        → 500, backend credential missing
//! RequestFailed        → 500, transport retries exhausted
//! Stream               → in-band SSE error event (status already sent)
//! ```

use axum::http::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

/// Errors surfaced to callers of the proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Missing, invalid, disabled, or expired credential.
    #[error("{0}")]
    AuthFailure(String),

    /// Model or endpoint outside the caller's allow-list.
    #[error("{0}")]
    PermissionDenied(String),

    /// Malformed request body.
    #[error("{0}")]
    InvalidRequest(String),

    /// No eligible backend after exclusions.
    #[error("No available backend for model: {model}")]
    NoBackendAvailable { model: String },

    /// Backend cannot be called as configured.
    #[error("Backend {backend} is misconfigured: {reason}")]
    Configuration { backend: String, reason: String },

    /// Transport failures exhausted the retry budget.
    #[error("Request failed after {attempts} attempts: {details}")]
    RequestFailed { attempts: usize, details: String },

    /// Upstream failure in the middle of an SSE relay.
    #[error("Stream request failed: {0}")]
    Stream(String),
}

impl ProxyError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::AuthFailure(_) => StatusCode::UNAUTHORIZED,
            ProxyError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::NoBackendAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Configuration { .. }
            | ProxyError::RequestFailed { .. }
            | ProxyError::Stream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON error body.
    ///
    /// Authorization and request-shape failures use the flat
    /// `{"error": "..."}` form; dispatch failures use the structured
    /// `{"error": {"message", "type", ...}}` form.
    pub fn body(&self) -> Value {
        match self {
            ProxyError::AuthFailure(msg)
            | ProxyError::PermissionDenied(msg)
            | ProxyError::InvalidRequest(msg) => json!({ "error": msg }),
            ProxyError::NoBackendAvailable { .. } => json!({
                "error": {
                    "message": self.to_string(),
                    "type": "service_unavailable",
                    "code": "no_backend_available",
                }
            }),
            ProxyError::Configuration { .. } => json!({
                "error": {
                    "message": self.to_string(),
                    "type": "configuration_error",
                }
            }),
            ProxyError::RequestFailed { details, .. } => json!({
                "error": {
                    "message": "Request failed after multiple attempts",
                    "type": "request_failed",
                    "details": details,
                }
            }),
            ProxyError::Stream(details) => json!({
                "error": {
                    "message": "Stream request failed",
                    "type": "stream_failed",
                    "details": details,
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ProxyError::AuthFailure("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ProxyError::PermissionDenied("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ProxyError::NoBackendAvailable { model: "gpt-4".into() }.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ProxyError::RequestFailed { attempts: 3, details: "boom".into() }.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_no_backend_body_names_model() {
        let err = ProxyError::NoBackendAvailable { model: "gpt-4-turbo".into() };
        let body = err.body();
        assert_eq!(body["error"]["type"], "service_unavailable");
        assert!(body["error"]["message"].as_str().unwrap().contains("gpt-4-turbo"));
    }

    #[test]
    fn test_flat_body_for_auth() {
        let body = ProxyError::AuthFailure("Invalid token".into()).body();
        assert_eq!(body, json!({ "error": "Invalid token" }));
    }
}
