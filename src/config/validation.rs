//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, retry budget >= 1)
//! - Flag inbound timeouts shorter than the buffered retry budget
//! - Check uniqueness (provider names, caller tokens)
//! - Check backend base URLs and listener addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// Minimum accepted caller token length.
pub const MIN_TOKEN_LEN: usize = 8;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid listener address '{0}'")]
    ListenerAddress(String),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("duplicate provider name '{0}'")]
    DuplicateProvider(String),

    #[error("backend '{backend}' of provider '{provider}' has invalid base_url '{url}'")]
    BackendUrl {
        provider: String,
        backend: String,
        url: String,
    },

    #[error("caller '{0}' has a token shorter than {MIN_TOKEN_LEN} characters")]
    CallerTokenTooShort(String),

    #[error("caller '{0}' reuses a token already assigned to another caller")]
    DuplicateCallerToken(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::ListenerAddress(config.listener.bind_address.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(config.observability.metrics_address.clone()));
    }

    if config.retries.max_retries == 0 {
        errors.push(ValidationError::Zero("retries.max_retries"));
    }
    if config.retries.consecutive_failure_threshold == 0 {
        errors.push(ValidationError::Zero("retries.consecutive_failure_threshold"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.timeouts.stream_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.stream_secs"));
    }
    if config.timeouts.inbound_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.inbound_secs"));
    }
    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::Zero("health_check.interval_secs"));
    }

    let mut provider_names = HashSet::new();
    for provider in &config.providers {
        if !provider_names.insert(provider.name.as_str()) {
            errors.push(ValidationError::DuplicateProvider(provider.name.clone()));
        }
        for backend in &provider.backends {
            let ok = Url::parse(&backend.base_url)
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !ok {
                errors.push(ValidationError::BackendUrl {
                    provider: provider.name.clone(),
                    backend: backend.name.clone(),
                    url: backend.base_url.clone(),
                });
            }
        }
    }

    let mut tokens = HashSet::new();
    for caller in &config.callers {
        if caller.token.len() < MIN_TOKEN_LEN {
            errors.push(ValidationError::CallerTokenTooShort(caller.id.clone()));
        }
        if !tokens.insert(caller.token.as_str()) {
            errors.push(ValidationError::DuplicateCallerToken(caller.id.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Whether the inbound timeout leaves room for every buffered retry attempt.
///
/// A shorter inbound timeout is accepted but cuts retries off early.
pub fn inbound_covers_retries(config: &ProxyConfig) -> bool {
    let budget = config
        .timeouts
        .request_secs
        .saturating_mul(u64::from(config.retries.max_retries));
    config.timeouts.inbound_secs >= budget
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BackendConfig, CallerConfig, ProviderConfig};

    fn backend(url: &str) -> BackendConfig {
        BackendConfig {
            name: "b1".into(),
            base_url: url.into(),
            api_key: Some("k".into()),
            api_key_env: None,
            models: None,
            balance_path: None,
        }
    }

    fn caller(id: &str, token: &str) -> CallerConfig {
        CallerConfig {
            id: id.into(),
            token: token.into(),
            enabled: true,
            sign_timeout_secs: 0,
            allowed_models: Vec::new(),
            allowed_endpoints: Vec::new(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ProxyConfig::default();
        config.providers.push(ProviderConfig { name: "p".into(), backends: vec![backend("ftp://x")] });
        config.providers.push(ProviderConfig { name: "p".into(), backends: vec![] });
        config.callers.push(caller("short", "abc"));
        config.timeouts.request_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::DuplicateProvider("p".into())));
        assert!(errors.contains(&ValidationError::CallerTokenTooShort("short".into())));
        assert!(errors.contains(&ValidationError::Zero("timeouts.request_secs")));
    }

    #[test]
    fn test_inbound_timeout_checks() {
        let mut config = ProxyConfig::default();
        assert!(inbound_covers_retries(&config));

        config.timeouts.request_secs = 60;
        config.retries.max_retries = 3;
        config.timeouts.inbound_secs = 120;
        assert!(!inbound_covers_retries(&config));
        assert!(validate_config(&config).is_ok());

        config.timeouts.inbound_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::Zero("timeouts.inbound_secs")]);
    }

    #[test]
    fn test_duplicate_tokens_rejected() {
        let mut config = ProxyConfig::default();
        config.callers.push(caller("a", "same-token-123"));
        config.callers.push(caller("b", "same-token-123"));
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::DuplicateCallerToken("b".into())]);
    }
}
