//! Configuration loading from disk and environment.

use std::path::Path;
use std::fs;
use thiserror::Error;
use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Pool refresh interval override (seconds).
pub const ENV_REFRESH_INTERVAL: &str = "OPENAI_PROXY_REFRESH_INTERVAL";
/// Default upstream timeout override (seconds).
pub const ENV_DEFAULT_TIMEOUT: &str = "OPENAI_PROXY_DEFAULT_TIMEOUT";
/// Retry budget override.
pub const ENV_MAX_RETRIES: &str = "OPENAI_PROXY_MAX_RETRIES";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// Environment overrides are applied before validation.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: ProxyConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `OPENAI_PROXY_*` overrides.
///
/// Values that do not parse as unsigned integers are ignored and the
/// configured value is kept.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let numeric = |key: &str| -> Option<u64> {
        let raw = lookup(key)?;
        match raw.trim().parse::<u64>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring non-numeric environment override");
                None
            }
        }
    };

    if let Some(secs) = numeric(ENV_REFRESH_INTERVAL) {
        config.pool.refresh_interval_secs = secs;
    }
    if let Some(secs) = numeric(ENV_DEFAULT_TIMEOUT) {
        config.timeouts.request_secs = secs;
    }
    if let Some(retries) = numeric(ENV_MAX_RETRIES) {
        config.retries.max_retries = u32::try_from(retries).unwrap_or(u32::MAX);
    }
}
