//! Backend pool management.
//!
//! # Responsibilities
//! - Enumerate providers into a pool of backends
//! - Refresh the pool when it is older than the configured age
//! - Answer candidate queries by model and exclusion set
//!
//! # Design Decisions
//! - The pool is an `ArcSwap`: readers take a snapshot and never observe a
//!   partially rebuilt pool
//! - Refreshes are serialized by an async mutex; a request that waited on a
//!   refresh finds the pool fresh and skips its own
//! - Provider failures are logged and the provider is left out of the new pool

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use tokio::sync::Mutex;

use crate::observability::metrics;
use crate::registry::backend::{BackendDescriptor, BackendId, PoolEntry};
use crate::registry::provider::ProviderSource;

type Providers = Vec<Arc<dyn ProviderSource>>;
type Pool = Vec<Arc<PoolEntry>>;

/// Owns the provider list and the current pool.
pub struct BackendRegistry {
    providers: ArcSwap<Providers>,
    pool: ArcSwap<Pool>,
    last_refresh: Mutex<Option<Instant>>,
    stale: AtomicBool,
    fallback_models: Vec<String>,
}

impl BackendRegistry {
    /// Create a registry. The pool is empty until the first refresh.
    pub fn new(providers: Providers, fallback_models: Vec<String>) -> Self {
        Self {
            providers: ArcSwap::from_pointee(providers),
            pool: ArcSwap::from_pointee(Vec::new()),
            last_refresh: Mutex::new(None),
            stale: AtomicBool::new(false),
            fallback_models,
        }
    }

    /// Refresh if the pool was never built, was marked stale, or is older
    /// than `max_age`.
    pub async fn refresh_if_stale(&self, max_age: Duration) {
        let mut last = self.last_refresh.lock().await;
        let forced = self.stale.swap(false, Ordering::AcqRel);
        let expired = last.map_or(true, |at| at.elapsed() > max_age);
        if !(forced || expired) {
            return;
        }
        self.rebuild().await;
        *last = Some(Instant::now());
    }

    /// Unconditionally rebuild the pool.
    pub async fn refresh(&self) {
        let mut last = self.last_refresh.lock().await;
        self.stale.store(false, Ordering::Release);
        self.rebuild().await;
        *last = Some(Instant::now());
    }

    async fn rebuild(&self) {
        let providers = self.providers.load_full();
        let mut entries: Pool = Vec::new();
        let mut seen = HashSet::new();

        for provider in providers.iter() {
            let handles = match provider.enumerate_backends().await {
                Ok(handles) => handles,
                Err(e) => {
                    tracing::warn!(provider = %provider.name(), error = %e, "Provider enumeration failed, skipping");
                    metrics::record_provider_failure(provider.name());
                    continue;
                }
            };

            for handle in handles {
                let id = BackendId::derive(provider.name(), handle.name(), handle.base_url());
                if !seen.insert(id) {
                    tracing::warn!(provider = %provider.name(), backend = %handle.name(), "Duplicate backend skipped");
                    continue;
                }

                let models = match handle.advertised_models() {
                    Some(models) => models,
                    None => match handle.list_models().await {
                        Ok(models) if !models.is_empty() => models,
                        Ok(_) => self.fallback_models.clone(),
                        Err(e) => {
                            tracing::debug!(backend = %handle.name(), error = %e, "Model listing failed, using fallback models");
                            self.fallback_models.clone()
                        }
                    },
                };

                let descriptor = BackendDescriptor {
                    id,
                    provider: provider.name().to_string(),
                    name: handle.name().to_string(),
                    base_url: handle.base_url().to_string(),
                    credential: handle.credential().to_string(),
                    models,
                };
                entries.push(Arc::new(PoolEntry { descriptor, handle }));
            }
        }

        tracing::info!(
            providers = providers.len(),
            backends = entries.len(),
            "Backend pool refreshed"
        );
        metrics::record_pool_size(entries.len());
        self.pool.store(Arc::new(entries));
    }

    /// Backends serving `model`, minus `exclude`.
    pub fn candidates_for_model(&self, model: &str, exclude: &HashSet<BackendId>) -> Vec<Arc<PoolEntry>> {
        self.pool
            .load()
            .iter()
            .filter(|e| !exclude.contains(&e.id()) && e.descriptor.supports_model(model))
            .cloned()
            .collect()
    }

    /// Number of configured providers (not backends).
    pub fn provider_count(&self) -> usize {
        self.providers.load().len()
    }

    /// Current pool.
    pub fn snapshot(&self) -> Arc<Pool> {
        self.pool.load_full()
    }

    /// Look up a pooled backend.
    pub fn get(&self, id: BackendId) -> Option<Arc<PoolEntry>> {
        self.pool.load().iter().find(|e| e.id() == id).cloned()
    }

    /// Swap the provider list. The next `refresh_if_stale` rebuilds the pool.
    pub fn replace_providers(&self, providers: Providers) {
        self.providers.store(Arc::new(providers));
        self.stale.store(true, Ordering::Release);
    }
}
