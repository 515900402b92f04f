//! Selection engine.
//!
//! # Responsibilities
//! - Keep the pool fresh before selecting
//! - Resolve the strategy for a request
//! - Skip unhealthy and failing candidates, bounded by the retry budget
//! - Report pool status for the status endpoint

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::health::{HealthTracker, HealthView};
use crate::observability::metrics;
use crate::registry::{BackendId, BackendRegistry, PoolEntry};
use crate::selector::{RandomStrategy, RoundRobin, SelectionContext, SelectionStrategy};
use crate::stats::{StatsRecord, StatsTracker};

/// Reason recorded when a selected candidate is rejected.
pub const REJECTED_REASON: &str = "failed health check";

/// Chooses backends for requests.
pub struct Selector {
    registry: Arc<BackendRegistry>,
    health: Arc<HealthTracker>,
    stats: Arc<StatsTracker>,
    strategies: HashMap<String, Arc<dyn SelectionStrategy>>,
    default_strategy: String,
    refresh_interval: Duration,
    failure_threshold: u32,
}

impl Selector {
    pub fn new(
        registry: Arc<BackendRegistry>,
        health: Arc<HealthTracker>,
        stats: Arc<StatsTracker>,
        refresh_interval: Duration,
        failure_threshold: u32,
    ) -> Self {
        let mut strategies: HashMap<String, Arc<dyn SelectionStrategy>> = HashMap::new();
        strategies.insert("random".to_string(), Arc::new(RandomStrategy::new()));
        strategies.insert("round_robin".to_string(), Arc::new(RoundRobin::new()));

        Self {
            registry,
            health,
            stats,
            strategies,
            default_strategy: "random".to_string(),
            refresh_interval,
            failure_threshold,
        }
    }

    /// Strategy used when a request names none.
    pub fn with_default_strategy(mut self, name: impl Into<String>) -> Self {
        self.default_strategy = name.into();
        self
    }

    /// Register or replace a named strategy.
    pub fn with_strategy(mut self, name: impl Into<String>, strategy: Arc<dyn SelectionStrategy>) -> Self {
        self.strategies.insert(name.into(), strategy);
        self
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn stats(&self) -> &Arc<StatsTracker> {
        &self.stats
    }

    fn strategy_for(&self, ctx: &SelectionContext) -> Arc<dyn SelectionStrategy> {
        let name = ctx.strategy.as_deref().unwrap_or(&self.default_strategy);
        self.strategies
            .get(name)
            .or_else(|| self.strategies.get("random"))
            .cloned()
            .unwrap_or_else(|| Arc::new(RandomStrategy::new()))
    }

    /// Pick one candidate for `ctx.model`, ignoring health.
    ///
    /// `None` means no backend serves the model outside `ctx.exclude`.
    pub async fn select(&self, ctx: &SelectionContext) -> Option<Arc<PoolEntry>> {
        self.registry.refresh_if_stale(self.refresh_interval).await;

        let candidates = self.registry.candidates_for_model(&ctx.model, &ctx.exclude);
        if candidates.is_empty() {
            tracing::warn!(model = %ctx.model, excluded = ctx.exclude.len(), "No available backends for model");
            return None;
        }

        self.strategy_for(ctx).select(&candidates, ctx)
    }

    /// Pick a healthy candidate without a failure streak.
    ///
    /// Tries at most `ctx.max_retries` candidates. Each rejected one is
    /// excluded for the rest of the loop and marked unhealthy.
    pub async fn select_with_fallback(&self, ctx: &SelectionContext) -> Option<Arc<PoolEntry>> {
        let mut attempt = ctx.clone();

        for _ in 0..ctx.max_retries {
            let Some(entry) = self.select(&attempt).await else {
                metrics::record_selection("no_candidates");
                return None;
            };

            let id = entry.id();
            if self.health.is_healthy(id) && !self.stats.has_consecutive_failures(id, self.failure_threshold) {
                tracing::debug!(backend = %entry.descriptor.name, model = %ctx.model, "Backend selected");
                metrics::record_selection("selected");
                return Some(entry);
            }

            tracing::debug!(backend = %entry.descriptor.name, model = %ctx.model, "Candidate rejected");
            attempt.exclude.insert(id);
            self.health.mark_unhealthy(id, REJECTED_REASON);
        }

        tracing::warn!(model = %ctx.model, attempts = ctx.max_retries, "Selection retry budget exhausted");
        metrics::record_selection("exhausted");
        None
    }

    /// Pool overview with each backend's health and stats.
    pub async fn pool_status(&self) -> PoolStatus {
        self.registry.refresh_if_stale(self.refresh_interval).await;

        let pool = self.registry.snapshot();
        let backends: Vec<BackendStatus> = pool
            .iter()
            .map(|entry| {
                let id = entry.id();
                BackendStatus {
                    id,
                    name: entry.descriptor.name.clone(),
                    provider: entry.descriptor.provider.clone(),
                    base_url: entry.descriptor.base_url.clone(),
                    models: entry.descriptor.models.clone(),
                    is_healthy: self.health.is_healthy(id),
                    health: self.health.view(id),
                    stats: self.stats.get(id),
                }
            })
            .collect();

        PoolStatus {
            total_providers: self.registry.provider_count(),
            total_backends: backends.len(),
            healthy_backends: backends.iter().filter(|b| b.is_healthy).count(),
            backends,
        }
    }
}

/// Status of the whole pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub total_providers: usize,
    pub total_backends: usize,
    pub healthy_backends: usize,
    pub backends: Vec<BackendStatus>,
}

/// Status of one backend. Never includes the credential.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub id: BackendId,
    pub name: String,
    pub provider: String,
    pub base_url: String,
    pub models: Vec<String>,
    pub is_healthy: bool,
    pub health: Option<HealthView>,
    pub stats: Option<StatsRecord>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::registry::{BackendDescriptor, BackendHandle, ProviderError, ProviderSource};
    use async_trait::async_trait;
    use serde_json::Value;

    pub(crate) struct StubHandle {
        pub name: String,
        pub models: Vec<String>,
    }

    #[async_trait]
    impl BackendHandle for StubHandle {
        fn name(&self) -> &str {
            &self.name
        }
        fn base_url(&self) -> &str {
            "https://api.example.com"
        }
        fn credential(&self) -> &str {
            "k"
        }
        fn advertised_models(&self) -> Option<Vec<String>> {
            Some(self.models.clone())
        }
        async fn check_available(&self) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn balance(&self) -> Result<Option<Value>, ProviderError> {
            Ok(None)
        }
        async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
            Ok(self.models.clone())
        }
    }

    /// Build a pool entry without going through a provider.
    pub(crate) fn entry(name: &str, models: &[&str]) -> Arc<PoolEntry> {
        let models: Vec<String> = models.iter().map(|m| m.to_string()).collect();
        Arc::new(PoolEntry {
            descriptor: BackendDescriptor {
                id: BackendId::derive("test", name, "https://api.example.com"),
                provider: "test".into(),
                name: name.into(),
                base_url: "https://api.example.com".into(),
                credential: "k".into(),
                models: models.clone(),
            },
            handle: Arc::new(StubHandle { name: name.into(), models }),
        })
    }

    struct StaticProvider(Vec<&'static str>);

    #[async_trait]
    impl ProviderSource for StaticProvider {
        fn name(&self) -> &str {
            "test"
        }
        async fn enumerate_backends(&self) -> Result<Vec<Arc<dyn BackendHandle>>, ProviderError> {
            Ok(self
                .0
                .iter()
                .map(|n| Arc::new(StubHandle { name: n.to_string(), models: vec!["gpt-4".into()] }) as Arc<dyn BackendHandle>)
                .collect())
        }
    }

    fn selector(names: Vec<&'static str>) -> Selector {
        let source: Arc<dyn ProviderSource> = Arc::new(StaticProvider(names));
        Selector::new(
            Arc::new(BackendRegistry::new(vec![source], Vec::new())),
            Arc::new(HealthTracker::new(Duration::from_secs(60))),
            Arc::new(StatsTracker::new()),
            Duration::from_secs(300),
            3,
        )
    }

    fn id(name: &str) -> BackendId {
        BackendId::derive("test", name, "https://api.example.com")
    }

    #[tokio::test]
    async fn test_select_refreshes_and_picks() {
        let s = selector(vec!["a"]);
        let picked = s.select(&SelectionContext::new("gpt-4-turbo")).await.unwrap();
        assert_eq!(picked.descriptor.name, "a");
        assert!(s.select(&SelectionContext::new("claude-3")).await.is_none());
    }

    #[tokio::test]
    async fn test_fallback_skips_unhealthy() {
        let s = selector(vec!["a", "b"]);
        s.health().mark_unhealthy(id("a"), "down");

        for _ in 0..20 {
            let picked = s.select_with_fallback(&SelectionContext::new("gpt-4")).await.unwrap();
            assert_eq!(picked.descriptor.name, "b");
        }
    }

    #[tokio::test]
    async fn test_fallback_skips_failure_streak() {
        let s = selector(vec!["a", "b"]);
        for _ in 0..3 {
            s.stats().record_request(id("b"), 1, false);
        }
        for _ in 0..20 {
            let picked = s.select_with_fallback(&SelectionContext::new("gpt-4")).await.unwrap();
            assert_eq!(picked.descriptor.name, "a");
        }
    }

    #[tokio::test]
    async fn test_fallback_exhausts_budget() {
        let s = selector(vec!["a", "b", "c"]);
        for n in ["a", "b", "c"] {
            s.health().mark_unhealthy(id(n), "down");
        }

        let ctx = SelectionContext::new("gpt-4").with_max_retries(2);
        assert!(s.select_with_fallback(&ctx).await.is_none());

        let rejected = ["a", "b", "c"]
            .iter()
            .filter(|n| s.health().get(id(n)).unwrap().reason.as_deref() == Some(REJECTED_REASON))
            .count();
        assert_eq!(rejected, 2);

        let ctx = SelectionContext::new("gpt-4").with_max_retries(3);
        assert!(s.select_with_fallback(&ctx).await.is_none());
        let rejected = ["a", "b", "c"]
            .iter()
            .filter(|n| s.health().get(id(n)).unwrap().reason.as_deref() == Some(REJECTED_REASON))
            .count();
        assert_eq!(rejected, 3);
    }

    #[tokio::test]
    async fn test_fallback_honors_caller_exclusions() {
        let s = selector(vec!["a", "b"]);
        let mut ctx = SelectionContext::new("gpt-4");
        ctx.exclude.insert(id("a"));
        for _ in 0..20 {
            assert_eq!(s.select_with_fallback(&ctx).await.unwrap().descriptor.name, "b");
        }
    }

    #[tokio::test]
    async fn test_unknown_strategy_falls_back_to_random() {
        let s = selector(vec!["a"]);
        let ctx = SelectionContext::new("gpt-4").with_strategy(Some("weighted_score".into()));
        assert!(s.select(&ctx).await.is_some());
    }

    #[tokio::test]
    async fn test_pool_status_counts() {
        let s = selector(vec!["a", "b"]);
        s.health().mark_unhealthy(id("a"), "down");
        s.stats().record_request(id("b"), 12, true);

        let status = s.pool_status().await;
        assert_eq!(status.total_providers, 1);
        assert_eq!(status.total_backends, 2);
        assert_eq!(status.healthy_backends, 1);
        let b = status.backends.iter().find(|b| b.name == "b").unwrap();
        assert_eq!(b.stats.as_ref().unwrap().successes, 1);
        let json = serde_json::to_string(&status).unwrap();
        assert!(!json.contains("\"credential\""));
    }
}
