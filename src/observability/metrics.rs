//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, health, selection, streams)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-backend and aggregate metrics
//!
//! # Metrics
//! - `proxy_requests_total` (counter): upstream calls by endpoint, status, backend
//! - `proxy_request_duration_seconds` (histogram): upstream call latency
//! - `proxy_backend_health` (gauge): 1=healthy, 0=unhealthy
//! - `proxy_selection_total` (counter): selection outcomes
//! - `proxy_stream_total` (counter): stream relay outcomes
//! - `proxy_pool_backends` (gauge): pooled backends after the last refresh
//! - `proxy_provider_failures_total` (counter): failed provider enumerations

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its HTTP listener.
///
/// Failure is logged; the proxy keeps running without metrics.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// One upstream call.
pub fn record_request(endpoint: &str, status: u16, backend: &str, started: Instant) {
    counter!(
        "proxy_requests_total",
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "endpoint" => endpoint.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_backend_health(backend: &str, healthy: bool) {
    gauge!("proxy_backend_health", "backend" => backend.to_string()).set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_selection(outcome: &str) {
    counter!("proxy_selection_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_stream(outcome: &str) {
    counter!("proxy_stream_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_pool_size(backends: usize) {
    gauge!("proxy_pool_backends").set(backends as f64);
}

pub fn record_provider_failure(provider: &str) {
    counter!("proxy_provider_failures_total", "provider" => provider.to_string()).increment(1);
}
