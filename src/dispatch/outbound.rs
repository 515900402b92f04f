//! Outbound request construction.
//!
//! # Responsibilities
//! - Join backend base URLs and endpoint paths
//! - Pick provider-specific auth headers from the backend host
//! - Build the shared upstream HTTP client
//!
//! # Header Styles
//! ```text
//! host contains "azure.com"      → api-key
//! host contains "anthropic.com"  → x-api-key + anthropic-version
//! host contains "google"         → Authorization: Bearer + x-goog-api-key
//! anything else                  → Authorization: Bearer
//! ```

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use url::Url;

use crate::config::schema::TimeoutConfig;
use crate::error::ProxyError;

/// Version pinned on Anthropic-style backends.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const API_KEY: HeaderName = HeaderName::from_static("api-key");
const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");
const ANTHROPIC_VERSION_HEADER: HeaderName = HeaderName::from_static("anthropic-version");
const X_GOOG_API_KEY: HeaderName = HeaderName::from_static("x-goog-api-key");

/// Join `base_url` and `path` with exactly one slash between them.
pub fn build_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Build request headers for a backend.
///
/// An empty credential is a configuration error for this call.
pub fn auth_headers(backend: &str, base_url: &str, credential: &str) -> Result<HeaderMap, ProxyError> {
    if credential.is_empty() {
        return Err(ProxyError::Configuration {
            backend: backend.to_string(),
            reason: "API key is missing".to_string(),
        });
    }

    let value = |raw: String| {
        HeaderValue::from_str(&raw).map_err(|_| ProxyError::Configuration {
            backend: backend.to_string(),
            reason: "API key contains characters not allowed in a header".to_string(),
        })
    };

    let host = Url::parse(base_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .unwrap_or_else(|| base_url.to_ascii_lowercase());

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if host.contains("azure.com") {
        headers.insert(API_KEY, value(credential.to_string())?);
    } else if host.contains("anthropic.com") {
        headers.insert(X_API_KEY, value(credential.to_string())?);
        headers.insert(ANTHROPIC_VERSION_HEADER, HeaderValue::from_static(ANTHROPIC_VERSION));
    } else if host.contains("google") {
        headers.insert(AUTHORIZATION, value(format!("Bearer {}", credential))?);
        headers.insert(X_GOOG_API_KEY, value(credential.to_string())?);
    } else {
        headers.insert(AUTHORIZATION, value(format!("Bearer {}", credential))?);
    }

    Ok(headers)
}

/// Build the upstream client shared by dispatch and probes.
///
/// Per-call timeouts are applied on each request; only the connect
/// timeout is fixed here.
pub fn build_client(timeouts: &TimeoutConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(timeouts.connect_secs.max(1)))
        .user_agent(concat!("llm-pool-proxy/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to build tuned HTTP client, using defaults");
            reqwest::Client::new()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_single_slash() {
        assert_eq!(build_url("https://api.example.com", "/chat/completions"), "https://api.example.com/chat/completions");
        assert_eq!(build_url("https://api.example.com/", "chat/completions"), "https://api.example.com/chat/completions");
        assert_eq!(build_url("https://api.example.com/v1//", "//models"), "https://api.example.com/v1/models");
    }

    #[test]
    fn test_default_bearer() {
        let h = auth_headers("b", "https://api.example.com", "k").unwrap();
        assert_eq!(h.get(AUTHORIZATION).unwrap(), "Bearer k");
        assert_eq!(h.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_anthropic_never_sends_authorization() {
        let h = auth_headers("b", "https://api.anthropic.com/v1", "k").unwrap();
        assert_eq!(h.get("x-api-key").unwrap(), "k");
        assert_eq!(h.get("anthropic-version").unwrap(), ANTHROPIC_VERSION);
        assert!(h.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_azure_and_google() {
        let azure = auth_headers("b", "https://x.openai.azure.com", "k").unwrap();
        assert_eq!(azure.get("api-key").unwrap(), "k");
        assert!(azure.get(AUTHORIZATION).is_none());

        let google = auth_headers("b", "https://generativelanguage.googleapis.com", "k").unwrap();
        assert_eq!(google.get(AUTHORIZATION).unwrap(), "Bearer k");
        assert_eq!(google.get("x-goog-api-key").unwrap(), "k");
    }

    #[test]
    fn test_empty_credential_is_configuration_error() {
        let err = auth_headers("b", "https://api.example.com", "").unwrap_err();
        assert!(matches!(err, ProxyError::Configuration { .. }));
    }
}
