//! Request parsing.
//!
//! # Responsibilities
//! - Extract and sanity-check the bearer credential
//! - Build the validation context (timestamp, nonce, client info)
//!   with the `Date` header as the timestamp fallback
//! - Turn proxy headers into call options
//! - Parse the JSON object body
//!
//! # Design Decisions
//! - Malformed credentials are rejected before the authenticator sees them
//! - Unparseable option headers are ignored rather than rejected

use std::time::Duration;

use axum::http::{header, HeaderMap};
use bytes::Bytes;
use chrono::DateTime;
use serde_json::Value;

use crate::auth::ValidationContext;
use crate::config::validation::MIN_TOKEN_LEN;
use crate::dispatch::CallOptions;
use crate::error::ProxyError;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_REQUEST_TIMESTAMP: &str = "x-request-timestamp";
pub const X_REQUEST_NONCE: &str = "x-request-nonce";
pub const X_PROXY_TIMEOUT: &str = "x-proxy-timeout";
pub const X_PROXY_STRATEGY: &str = "x-proxy-strategy";

/// Message returned when no usable bearer credential is present.
pub const MISSING_AUTH: &str = "Unauthorized - Missing or invalid Authorization header";

const MAX_USER_AGENT_LEN: usize = 500;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// Bearer token from the `Authorization` header.
///
/// The scheme is case-insensitive. Tokens shorter than the minimum length
/// or containing CR, LF, or TAB are rejected.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = header_str(headers, header::AUTHORIZATION.as_str())?;
    let (scheme, rest) = (value.get(..6)?, value.get(6..)?);
    if !scheme.eq_ignore_ascii_case("bearer") || !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let token = rest.trim_start();
    if token.len() < MIN_TOKEN_LEN || token.contains(['\r', '\n', '\t']) {
        return None;
    }
    Some(token.to_string())
}

/// Unix seconds from an HTTP `Date` value (IMF-fixdate).
fn http_date_secs(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value).ok().map(|dt| dt.timestamp())
}

/// Validation context from request headers.
///
/// The timestamp comes from `X-Request-Timestamp`, falling back to `Date`.
pub fn validation_context(headers: &HeaderMap) -> ValidationContext {
    let timestamp = header_str(headers, X_REQUEST_TIMESTAMP)
        .and_then(|v| v.parse::<i64>().ok())
        .or_else(|| header_str(headers, header::DATE.as_str()).and_then(http_date_secs))
        .filter(|ts| *ts > 0);

    let user_agent = header_str(headers, header::USER_AGENT.as_str()).map(|ua| {
        let end = ua
            .char_indices()
            .nth(MAX_USER_AGENT_LEN)
            .map_or(ua.len(), |(i, _)| i);
        ua[..end].to_string()
    });

    let ip_address = header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .or_else(|| header_str(headers, "x-real-ip").map(str::to_string));

    ValidationContext {
        timestamp,
        nonce: header_str(headers, X_REQUEST_NONCE).map(str::to_string),
        user_agent,
        ip_address,
    }
}

/// Call options from `X-Proxy-*` headers.
pub fn call_options(headers: &HeaderMap) -> CallOptions {
    CallOptions {
        timeout: header_str(headers, X_PROXY_TIMEOUT)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs),
        strategy: header_str(headers, X_PROXY_STRATEGY)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        max_retries: None,
    }
}

/// Parse a body that must be a JSON object.
pub fn parse_json_object(body: &Bytes) -> Result<Value, ProxyError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) if value.is_object() => Ok(value),
        _ => Err(ProxyError::InvalidRequest("Invalid JSON".to_string())),
    }
}
