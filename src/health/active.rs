//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every pooled backend
//! - Feed probe outcomes into the health tracker

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::config::schema::HealthCheckConfig;
use crate::health::state::HealthTracker;
use crate::registry::BackendRegistry;

pub struct HealthMonitor {
    registry: Arc<BackendRegistry>,
    health: Arc<HealthTracker>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(registry: Arc<BackendRegistry>, health: Arc<HealthTracker>, config: HealthCheckConfig) -> Self {
        Self {
            registry,
            health,
            config,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            timeout = self.config.timeout_secs,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every backend in the current pool once.
    pub async fn check_all(&self) {
        let timeout = Duration::from_secs(self.config.timeout_secs.max(1));
        let pool = self.registry.snapshot();

        for entry in pool.iter() {
            let handle = entry.handle.clone();
            self.health
                .active_probe(entry.id(), timeout, || async move {
                    handle.check_available().await.map_err(|e| e.to_string())?;
                    handle.balance().await.map_err(|e| e.to_string())?;
                    Ok(())
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BackendHandle, ProviderError, ProviderSource};
    use async_trait::async_trait;
    use serde_json::Value;

    struct Probed {
        name: &'static str,
        up: bool,
    }

    #[async_trait]
    impl BackendHandle for Probed {
        fn name(&self) -> &str {
            self.name
        }
        fn base_url(&self) -> &str {
            "https://api.example.com"
        }
        fn credential(&self) -> &str {
            "k"
        }
        fn advertised_models(&self) -> Option<Vec<String>> {
            Some(Vec::new())
        }
        async fn check_available(&self) -> Result<(), ProviderError> {
            if self.up { Ok(()) } else { Err(ProviderError::Status(502)) }
        }
        async fn balance(&self) -> Result<Option<Value>, ProviderError> {
            Ok(None)
        }
        async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
            Ok(Vec::new())
        }
    }

    struct TwoBackends;

    #[async_trait]
    impl ProviderSource for TwoBackends {
        fn name(&self) -> &str {
            "p"
        }
        async fn enumerate_backends(&self) -> Result<Vec<Arc<dyn BackendHandle>>, ProviderError> {
            let handles: Vec<Arc<dyn BackendHandle>> = vec![
                Arc::new(Probed { name: "up", up: true }),
                Arc::new(Probed { name: "down", up: false }),
            ];
            Ok(handles)
        }
    }

    #[tokio::test]
    async fn test_check_all_updates_tracker() {
        let source: Arc<dyn ProviderSource> = Arc::new(TwoBackends);
        let registry = Arc::new(BackendRegistry::new(vec![source], Vec::new()));
        registry.refresh().await;
        let health = Arc::new(HealthTracker::new(Duration::from_secs(60)));
        let config = HealthCheckConfig { enabled: true, ..HealthCheckConfig::default() };
        let monitor = HealthMonitor::new(registry.clone(), health.clone(), config);

        monitor.check_all().await;

        for entry in registry.snapshot().iter() {
            let expected = entry.descriptor.name == "up";
            assert_eq!(health.is_healthy(entry.id()), expected);
            assert!(health.get(entry.id()).is_some());
        }
    }

    #[tokio::test]
    async fn test_disabled_monitor_returns_immediately() {
        let registry = Arc::new(BackendRegistry::new(Vec::new(), Vec::new()));
        let health = Arc::new(HealthTracker::new(Duration::from_secs(60)));
        let monitor = HealthMonitor::new(registry, health, HealthCheckConfig::default());
        let (_tx, rx) = broadcast::channel(1);
        tokio::time::timeout(Duration::from_secs(1), monitor.run(rx)).await.unwrap();
    }
}
