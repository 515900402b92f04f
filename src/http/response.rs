//! Response construction.
//!
//! # Responsibilities
//! - Render `ProxyError` as JSON with the mapped status
//! - Pass upstream answers through with their status and content type
//! - Build SSE responses (streamed relay, or a single error event)

use std::convert::Infallible;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures_util::Stream;

use crate::dispatch::relay::sse_event;
use crate::dispatch::UpstreamResponse;
use crate::error::ProxyError;

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Upstream answer, status and body unchanged.
pub fn upstream(response: UpstreamResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = response
        .content_type
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));

    let mut out = Response::new(Body::from(response.body));
    *out.status_mut() = status;
    out.headers_mut().insert(header::CONTENT_TYPE, content_type);
    out
}

fn with_sse_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// 200 event stream fed by `body`.
pub fn sse_stream<S>(body: S) -> Response
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    with_sse_headers(Response::new(Body::from_stream(body)))
}

/// Event stream carrying one error event, with the error's status.
pub fn sse_error(err: &ProxyError) -> Response {
    let mut response = Response::new(Body::from(sse_event(&err.body())));
    *response.status_mut() = err.status();
    with_sse_headers(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_response_body() {
        let response = ProxyError::PermissionDenied("Model not allowed".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"error":"Model not allowed"}"#);
    }

    #[tokio::test]
    async fn test_sse_error_is_single_event() {
        let response = sse_error(&ProxyError::NoBackendAvailable { model: "gpt-4".into() });
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("data: {"));
        assert!(text.ends_with("\n\n"));
        assert_eq!(text.matches("data: ").count(), 1);
        assert!(text.contains("gpt-4"));
    }

    #[test]
    fn test_upstream_passthrough() {
        let response = upstream(UpstreamResponse {
            status: 418,
            content_type: Some("text/plain".into()),
            body: Bytes::from_static(b"teapot"),
        });
        assert_eq!(response.status().as_u16(), 418);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    }
}
