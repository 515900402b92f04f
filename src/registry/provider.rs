//! Provider sources and backend handles.
//!
//! # Responsibilities
//! - Define the seams the registry enumerates backends through
//! - Ship a config-backed provider producing HTTP backend handles
//! - Implement availability, balance, and model-listing calls
//!
//! # Design Decisions
//! - A provider fails enumeration as a whole; the registry skips it
//! - Handles are cheap to clone behind `Arc` and shared with the health monitor

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::schema::{BackendConfig, ProviderConfig, ProxyConfig};
use crate::dispatch::outbound::{auth_headers, build_url};

/// Errors from provider enumeration and backend calls.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("backend '{backend}' has invalid base URL '{url}'")]
    InvalidBaseUrl { backend: String, url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {0}")]
    Status(u16),

    #[error("backend '{0}' has no credential")]
    MissingCredential(String),
}

/// One upstream backend as seen by the registry and the health monitor.
#[async_trait]
pub trait BackendHandle: Send + Sync {
    fn name(&self) -> &str;
    fn base_url(&self) -> &str;
    fn credential(&self) -> &str;

    /// Statically advertised models. `None` means "ask the backend".
    fn advertised_models(&self) -> Option<Vec<String>>;

    /// Lightweight liveness call.
    async fn check_available(&self) -> Result<(), ProviderError>;

    /// Balance or status call. `Ok(None)` when the backend has none.
    async fn balance(&self) -> Result<Option<Value>, ProviderError>;

    /// Models reported by the backend itself.
    async fn list_models(&self) -> Result<Vec<String>, ProviderError>;
}

/// A named group of backends.
#[async_trait]
pub trait ProviderSource: Send + Sync {
    fn name(&self) -> &str;
    async fn enumerate_backends(&self) -> Result<Vec<Arc<dyn BackendHandle>>, ProviderError>;
}

/// OpenAI-compatible backend reached over HTTP.
pub struct HttpBackend {
    name: String,
    base_url: String,
    credential: String,
    models: Option<Vec<String>>,
    balance_path: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig, client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.base_url.clone(),
            credential: config.resolve_api_key(),
            models: config.models.clone(),
            balance_path: config.balance_path.clone(),
            client,
            timeout,
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ProviderError> {
        let headers = auth_headers(&self.name, &self.base_url, &self.credential)
            .map_err(|_| ProviderError::MissingCredential(self.name.clone()))?;
        let response = self
            .client
            .get(build_url(&self.base_url, path))
            .headers(headers)
            .timeout(self.timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl BackendHandle for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn credential(&self) -> &str {
        &self.credential
    }

    fn advertised_models(&self) -> Option<Vec<String>> {
        self.models.clone()
    }

    async fn check_available(&self) -> Result<(), ProviderError> {
        self.get("/models").await.map(|_| ())
    }

    async fn balance(&self) -> Result<Option<Value>, ProviderError> {
        let Some(path) = self.balance_path.as_deref() else {
            return Ok(None);
        };
        let body = self.get(path).await?.json::<Value>().await?;
        Ok(Some(body))
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let list = self.get("/models").await?.json::<ModelList>().await?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

/// Provider built from a `[[providers]]` table.
pub struct ConfigProvider {
    config: ProviderConfig,
    client: reqwest::Client,
    timeout: Duration,
}

impl ConfigProvider {
    pub fn new(config: ProviderConfig, client: reqwest::Client, timeout: Duration) -> Self {
        Self { config, client, timeout }
    }

    /// One provider source per configured provider.
    pub fn all_from_config(config: &ProxyConfig, client: &reqwest::Client) -> Vec<Arc<dyn ProviderSource>> {
        let timeout = Duration::from_secs(config.health_check.timeout_secs.max(1));
        config
            .providers
            .iter()
            .map(|p| Arc::new(Self::new(p.clone(), client.clone(), timeout)) as Arc<dyn ProviderSource>)
            .collect()
    }
}

#[async_trait]
impl ProviderSource for ConfigProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn enumerate_backends(&self) -> Result<Vec<Arc<dyn BackendHandle>>, ProviderError> {
        let mut handles: Vec<Arc<dyn BackendHandle>> = Vec::with_capacity(self.config.backends.len());
        for backend in &self.config.backends {
            let valid = Url::parse(&backend.base_url)
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !valid {
                return Err(ProviderError::InvalidBaseUrl {
                    backend: backend.name.clone(),
                    url: backend.base_url.clone(),
                });
            }
            handles.push(Arc::new(HttpBackend::new(backend, self.client.clone(), self.timeout)));
        }
        Ok(handles)
    }
}
