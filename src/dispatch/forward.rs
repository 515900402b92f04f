//! Buffered request forwarding.
//!
//! # Responsibilities
//! - Resolve a backend for the payload's model
//! - Send the request and pass 2xx answers through unchanged
//! - Attribute latency and outcome to the backend used
//! - Retry on transport failure against a different backend
//!
//! # Retry Policy
//! ```text
//! no backend            → 503, no retry
//! missing credential    → 500, no retry (config error, stats failure)
//! transport error / non-2xx
//!                       → stats failure, exclude backend,
//!                         retry while excluded < max_retries, else 500
//!                         (also 500 when no backend is left to retry on)
//! 2xx                   → stats success, pass-through
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde_json::Value;

use crate::config::ProxyConfig;
use crate::dispatch::outbound::{auth_headers, build_url};
use crate::dispatch::relay::StreamRelay;
use crate::error::ProxyError;
use crate::observability::metrics;
use crate::registry::PoolEntry;
use crate::selector::{PoolStatus, SelectionContext, Selector};
use crate::stats::{UsageSummary, UsageTracker};

/// Caller-supplied knobs for one call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
    pub strategy: Option<String>,
    pub max_retries: Option<usize>,
}

/// Upstream answer, passed through as received.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Upstream error bodies are cut to this many bytes in failure details.
const MAX_ERROR_BODY: usize = 512;

enum AttemptError {
    Config(ProxyError),
    /// `status` is set when the backend answered with a non-2xx.
    Transport { status: Option<u16>, details: String },
}

/// Forwards caller requests to pooled backends.
pub struct Dispatcher {
    selector: Arc<Selector>,
    usage: Arc<UsageTracker>,
    client: reqwest::Client,
    default_model: String,
    request_timeout: Duration,
    stream_timeout: Duration,
    max_retries: usize,
}

impl Dispatcher {
    pub fn new(selector: Arc<Selector>, client: reqwest::Client, config: &ProxyConfig) -> Self {
        Self {
            selector,
            usage: Arc::new(UsageTracker::new()),
            client,
            default_model: config.pool.default_model.clone(),
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            stream_timeout: Duration::from_secs(config.timeouts.stream_secs),
            max_retries: config.retries.max_retries as usize,
        }
    }

    pub fn selector(&self) -> &Arc<Selector> {
        &self.selector
    }

    /// Model named by the payload, or the configured default.
    pub fn model_of(&self, payload: &Value) -> String {
        payload
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_model)
            .to_string()
    }

    fn context_for(&self, payload: &Value, options: &CallOptions) -> SelectionContext {
        SelectionContext::new(self.model_of(payload))
            .with_max_retries(options.max_retries.unwrap_or(self.max_retries).max(1))
            .with_timeout(options.timeout)
            .with_strategy(options.strategy.clone())
    }

    /// Forward a buffered request to `endpoint`.
    pub async fn forward(&self, endpoint: &str, payload: &Value, options: CallOptions) -> Result<UpstreamResponse, ProxyError> {
        let mut ctx = self.context_for(payload, &options);
        let timeout = ctx.timeout.unwrap_or(self.request_timeout);
        let stats = self.selector.stats();

        let mut last_failure: Option<String> = None;

        loop {
            let Some(entry) = self.selector.select_with_fallback(&ctx).await else {
                if let Some(details) = last_failure {
                    metrics::record_request(endpoint, 500, "none", Instant::now());
                    return Err(ProxyError::RequestFailed {
                        attempts: ctx.exclude.len(),
                        details,
                    });
                }
                metrics::record_request(endpoint, 503, "none", Instant::now());
                return Err(ProxyError::NoBackendAvailable { model: ctx.model.clone() });
            };

            let started = Instant::now();
            let outcome = self.attempt(&entry, endpoint, payload, timeout).await;
            let latency_ms = started.elapsed().as_millis() as u64;
            let name = entry.descriptor.name.as_str();

            match outcome {
                Ok(response) => {
                    stats.record_request(entry.id(), latency_ms, true);
                    self.usage.record(name, &ctx.model, response.status, latency_ms);
                    metrics::record_request(endpoint, response.status, name, started);
                    tracing::info!(
                        backend = %name,
                        base_url = %entry.descriptor.base_url,
                        endpoint = %endpoint,
                        model = %ctx.model,
                        status = response.status,
                        latency_ms,
                        "Request forwarded"
                    );
                    return Ok(response);
                }
                Err(AttemptError::Config(err)) => {
                    stats.record_request(entry.id(), latency_ms, false);
                    metrics::record_request(endpoint, 500, name, started);
                    tracing::error!(backend = %name, endpoint = %endpoint, error = %err, "Backend misconfigured");
                    return Err(err);
                }
                Err(AttemptError::Transport { status, details }) => {
                    stats.record_request(entry.id(), latency_ms, false);
                    self.usage.record(name, &ctx.model, status.unwrap_or(500), latency_ms);
                    metrics::record_request(endpoint, status.unwrap_or(500), name, started);
                    tracing::error!(
                        backend = %name,
                        endpoint = %endpoint,
                        model = %ctx.model,
                        status = status.unwrap_or_default(),
                        error = %details,
                        latency_ms,
                        "Request failed"
                    );

                    ctx.exclude.insert(entry.id());
                    if ctx.exclude.len() < ctx.max_retries {
                        last_failure = Some(details);
                        continue;
                    }

                    return Err(ProxyError::RequestFailed {
                        attempts: ctx.exclude.len(),
                        details,
                    });
                }
            }
        }
    }

    async fn attempt(
        &self,
        entry: &PoolEntry,
        endpoint: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<UpstreamResponse, AttemptError> {
        let d = &entry.descriptor;
        let headers = auth_headers(&d.name, &d.base_url, &d.credential).map_err(AttemptError::Config)?;

        let response = self
            .client
            .post(build_url(&d.base_url, endpoint))
            .headers(headers)
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AttemptError::Transport {
                status: None,
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let end = body.len().min(MAX_ERROR_BODY);
            return Err(AttemptError::Transport {
                status: Some(status.as_u16()),
                details: format!(
                    "upstream returned status {}: {}",
                    status.as_u16(),
                    String::from_utf8_lossy(&body[..end])
                ),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| AttemptError::Transport {
            status: Some(status.as_u16()),
            details: e.to_string(),
        })?;

        Ok(UpstreamResponse {
            status: status.as_u16(),
            content_type,
            body,
        })
    }

    /// Resolve a backend for a streamed request.
    ///
    /// Only the no-backend case fails here; everything after is reported
    /// in-band by the returned relay.
    pub async fn open_stream(&self, endpoint: &str, payload: &Value, options: CallOptions) -> Result<StreamRelay, ProxyError> {
        let ctx = self.context_for(payload, &options);
        let Some(entry) = self.selector.select_with_fallback(&ctx).await else {
            metrics::record_stream("no_backend");
            return Err(ProxyError::NoBackendAvailable { model: ctx.model });
        };

        Ok(StreamRelay::new(
            entry,
            endpoint.to_string(),
            payload.clone(),
            ctx.model,
            self.client.clone(),
            self.selector.stats().clone(),
            self.usage.clone(),
            self.stream_timeout,
        ))
    }

    pub async fn pool_status(&self) -> PoolStatus {
        self.selector.pool_status().await
    }

    pub fn usage_summary(&self) -> std::collections::BTreeMap<String, UsageSummary> {
        self.usage.summary()
    }
}
