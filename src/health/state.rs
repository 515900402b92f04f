//! Backend health tracking.
//!
//! # States
//! - Healthy (or no record): backend is selectable
//! - Unhealthy: backend is skipped until the cool-down elapses
//!
//! # State Transitions
//! ```text
//! Unknown ──negative event──▶ Unhealthy(at T)
//! Unhealthy ──now >= T + cooldown──▶ reads as Healthy (lazy, no timer)
//! any ──negative event──▶ Unhealthy(at now)
//! any ──successful probe──▶ Healthy
//! ```
//!
//! # Design Decisions
//! - Expiry is evaluated on read, so no background task is needed
//! - Probe failures are recorded, never propagated

use std::future::Future;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use crate::observability::metrics;
use crate::registry::BackendId;

/// Health facet of a backend.
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub healthy: bool,
    pub checked_at: Instant,
    pub reason: Option<String>,
    pub latency_ms: u64,
}

/// Reportable view of a health record.
#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    pub is_healthy: bool,
    pub error: Option<String>,
    pub latency_ms: u64,
    pub checked_secs_ago: u64,
}

/// Per-backend health beliefs.
#[derive(Debug)]
pub struct HealthTracker {
    records: DashMap<BackendId, HealthRecord>,
    cooldown: Duration,
}

impl HealthTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            records: DashMap::new(),
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// True if the backend is selectable now.
    pub fn is_healthy(&self, id: BackendId) -> bool {
        self.is_healthy_at(id, Instant::now())
    }

    /// True if the backend is selectable at `now`.
    pub fn is_healthy_at(&self, id: BackendId, now: Instant) -> bool {
        match self.records.get(&id) {
            None => true,
            Some(record) => {
                record.healthy || now.saturating_duration_since(record.checked_at) >= self.cooldown
            }
        }
    }

    /// Record a negative event, restarting the cool-down.
    pub fn mark_unhealthy(&self, id: BackendId, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(backend = %id, reason = %reason, "Backend marked unhealthy");
        self.records.insert(
            id,
            HealthRecord {
                healthy: false,
                checked_at: Instant::now(),
                reason: Some(reason),
                latency_ms: 0,
            },
        );
        metrics::record_backend_health(&id.to_string(), false);
    }

    /// Record a positive check.
    pub fn mark_healthy(&self, id: BackendId, latency_ms: u64) {
        self.records.insert(
            id,
            HealthRecord {
                healthy: true,
                checked_at: Instant::now(),
                reason: None,
                latency_ms,
            },
        );
        metrics::record_backend_health(&id.to_string(), true);
    }

    /// Run a bounded probe and record its outcome.
    ///
    /// Returns whether the probe succeeded. A timeout counts as a failure.
    pub async fn active_probe<F, Fut>(&self, id: BackendId, timeout: Duration, probe: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), String>>,
    {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, probe()).await {
            Ok(result) => result,
            Err(_) => Err(format!("probe timed out after {}ms", timeout.as_millis())),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                tracing::debug!(backend = %id, latency_ms, "Probe succeeded");
                self.mark_healthy(id, latency_ms);
                true
            }
            Err(reason) => {
                tracing::warn!(backend = %id, latency_ms, reason = %reason, "Probe failed");
                self.records.insert(
                    id,
                    HealthRecord {
                        healthy: false,
                        checked_at: Instant::now(),
                        reason: Some(reason),
                        latency_ms,
                    },
                );
                metrics::record_backend_health(&id.to_string(), false);
                false
            }
        }
    }

    /// Raw record.
    pub fn get(&self, id: BackendId) -> Option<HealthRecord> {
        self.records.get(&id).map(|r| r.clone())
    }

    /// Reportable view, with cool-down expiry applied.
    pub fn view(&self, id: BackendId) -> Option<HealthView> {
        let now = Instant::now();
        let record = self.get(id)?;
        Some(HealthView {
            is_healthy: self.is_healthy_at(id, now),
            error: record.reason,
            latency_ms: record.latency_ms,
            checked_secs_ago: now.saturating_duration_since(record.checked_at).as_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: &str) -> BackendId {
        BackendId::derive("p", n, "https://x")
    }

    #[test]
    fn test_unknown_backend_is_healthy() {
        let tracker = HealthTracker::new(Duration::from_secs(60));
        assert!(tracker.is_healthy(id("a")));
        assert!(tracker.view(id("a")).is_none());
    }

    #[test]
    fn test_unhealthy_until_cooldown_elapses() {
        let tracker = HealthTracker::new(Duration::from_secs(60));
        tracker.mark_unhealthy(id("a"), "boom");
        assert!(!tracker.is_healthy(id("a")));

        let marked = tracker.get(id("a")).unwrap().checked_at;
        assert!(!tracker.is_healthy_at(id("a"), marked + Duration::from_secs(59)));
        assert!(tracker.is_healthy_at(id("a"), marked + Duration::from_secs(60)));
        assert!(tracker.is_healthy(id("b")));
    }

    #[test]
    fn test_mark_unhealthy_resets_latency() {
        let tracker = HealthTracker::new(Duration::from_secs(60));
        tracker.mark_healthy(id("a"), 42);
        tracker.mark_unhealthy(id("a"), "failed health check");
        let record = tracker.get(id("a")).unwrap();
        assert_eq!(record.latency_ms, 0);
        assert_eq!(record.reason.as_deref(), Some("failed health check"));
    }

    #[tokio::test]
    async fn test_probe_records_outcome() {
        let tracker = HealthTracker::new(Duration::from_secs(60));

        assert!(tracker.active_probe(id("ok"), Duration::from_secs(1), || async { Ok(()) }).await);
        assert!(tracker.get(id("ok")).unwrap().healthy);

        let failed = tracker
            .active_probe(id("bad"), Duration::from_secs(1), || async { Err("connection refused".to_string()) })
            .await;
        assert!(!failed);
        assert!(!tracker.is_healthy(id("bad")));
        assert_eq!(tracker.get(id("bad")).unwrap().reason.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_probe_timeout_is_failure() {
        let tracker = HealthTracker::new(Duration::from_secs(60));
        let ok = tracker
            .active_probe(id("slow"), Duration::from_millis(10), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(!ok);
        assert!(tracker.get(id("slow")).unwrap().reason.unwrap().contains("timed out"));
    }
}
