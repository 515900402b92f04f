//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream providers and the backends they expose.
    pub providers: Vec<ProviderConfig>,

    /// Callers allowed to use the proxy.
    pub callers: Vec<CallerConfig>,

    /// Backend pool settings.
    pub pool: PoolConfig,

    /// Health tracking and active probe settings.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Backend selection settings.
    pub selection: SelectionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request hardening.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// An upstream provider: a named group of OpenAI-compatible backends.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Provider label, unique across the config.
    pub name: String,

    /// Backends enumerated by this provider.
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

/// A single OpenAI-compatible backend.
#[derive(Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Backend name, used in logs and metrics.
    pub name: String,

    /// Base URL requests are joined onto (e.g., "https://api.openai.com/v1").
    pub base_url: String,

    /// Inline credential.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Name of an environment variable holding the credential.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Advertised models. `None` fetches the list from the backend at
    /// refresh time; an empty list accepts any model.
    #[serde(default)]
    pub models: Option<Vec<String>>,

    /// Optional path of a lightweight balance/status call used by probes.
    #[serde(default)]
    pub balance_path: Option<String>,
}

impl BackendConfig {
    /// Resolve the credential, preferring the inline key.
    /// A missing credential resolves to the empty string.
    pub fn resolve_api_key(&self) -> String {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return key.clone();
        }
        self.api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("api_key_env", &self.api_key_env)
            .field("models", &self.models)
            .field("balance_path", &self.balance_path)
            .finish()
    }
}

/// A caller credential and its permissions.
#[derive(Clone, Deserialize, Serialize)]
pub struct CallerConfig {
    /// Caller identifier for logs.
    pub id: String,

    /// Bearer token presented by the caller.
    pub token: String,

    /// Disabled callers are rejected with 401.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// When > 0, requests must carry a timestamp within this many seconds
    /// of the server clock.
    #[serde(default)]
    pub sign_timeout_secs: u64,

    /// Models this caller may use. Empty allows all.
    #[serde(default)]
    pub allowed_models: Vec<String>,

    /// Endpoints this caller may use. Empty allows all.
    #[serde(default)]
    pub allowed_endpoints: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl std::fmt::Debug for CallerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallerConfig")
            .field("id", &self.id)
            .field("token", &"***")
            .field("enabled", &self.enabled)
            .field("sign_timeout_secs", &self.sign_timeout_secs)
            .field("allowed_models", &self.allowed_models)
            .field("allowed_endpoints", &self.allowed_endpoints)
            .finish()
    }
}

/// Backend pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum pool age in seconds before the next request refreshes it.
    pub refresh_interval_secs: u64,

    /// Models advertised by backends whose model list cannot be fetched.
    pub fallback_models: Vec<String>,

    /// Model assumed when a payload carries none.
    pub default_model: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 300,
            fallback_models: vec!["gpt-3.5-turbo".to_string(), "gpt-4".to_string()],
            default_model: "gpt-3.5-turbo".to_string(),
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable periodic active probes.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,

    /// Probe timeout in seconds.
    pub timeout_secs: u64,

    /// Seconds a backend stays unhealthy after a negative event.
    pub cooldown_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 60,
            timeout_secs: 10,
            cooldown_secs: 60,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Default timeout of a buffered upstream call in seconds.
    pub request_secs: u64,

    /// Timeout of a streamed upstream call in seconds.
    pub stream_secs: u64,

    /// Upper bound on handling an inbound request (all retries included).
    pub inbound_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            stream_secs: 60,
            inbound_secs: 300,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum backends tried for one logical request.
    pub max_retries: u32,

    /// Consecutive failures after which a backend is skipped.
    pub consecutive_failure_threshold: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            consecutive_failure_threshold: 3,
        }
    }
}

/// Selection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Default strategy name ("random", "round_robin").
    pub strategy: String,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            strategy: "random".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}
