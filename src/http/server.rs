//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, limits, timeout)
//! - Build the dispatch stack (registry, health, stats, selector)
//! - Run the health monitor and apply config reloads
//! - Serve until shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::{CallerAuthenticator, StaticKeyAuthenticator};
use crate::config::validation::inbound_covers_retries;
use crate::config::ProxyConfig;
use crate::dispatch::outbound::build_client;
use crate::dispatch::Dispatcher;
use crate::health::{HealthMonitor, HealthTracker};
use crate::http::handlers;
use crate::registry::{BackendRegistry, ConfigProvider};
use crate::selector::Selector;
use crate::stats::StatsTracker;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub authenticator: Arc<dyn CallerAuthenticator>,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    dispatcher: Arc<Dispatcher>,
    authenticator: Arc<StaticKeyAuthenticator>,
    client: reqwest::Client,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Self {
        if !inbound_covers_retries(&config) {
            tracing::warn!(
                inbound_secs = config.timeouts.inbound_secs,
                request_secs = config.timeouts.request_secs,
                max_retries = config.retries.max_retries,
                "Inbound timeout is shorter than the retry budget; later retries will be cut off"
            );
        }

        let client = build_client(&config.timeouts);

        let registry = Arc::new(BackendRegistry::new(
            ConfigProvider::all_from_config(&config, &client),
            config.pool.fallback_models.clone(),
        ));
        let health = Arc::new(HealthTracker::new(Duration::from_secs(config.health_check.cooldown_secs)));
        let stats = Arc::new(StatsTracker::new());

        let selector = Arc::new(
            Selector::new(
                registry,
                health,
                stats,
                Duration::from_secs(config.pool.refresh_interval_secs),
                config.retries.consecutive_failure_threshold,
            )
            .with_default_strategy(config.selection.strategy.clone()),
        );
        let dispatcher = Arc::new(Dispatcher::new(selector, client.clone(), &config));
        let authenticator = Arc::new(StaticKeyAuthenticator::new(&config.callers));

        let state = AppState {
            dispatcher: dispatcher.clone(),
            authenticator: authenticator.clone(),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            dispatcher,
            authenticator,
            client,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/proxy/v1/chat/completions", post(handlers::chat_completions))
            .route("/proxy/v1/completions", post(handlers::completions))
            .route("/proxy/v1/embeddings", post(handlers::embeddings))
            .route("/proxy/v1/models", get(handlers::models))
            .route("/proxy/v1/status", get(handlers::status))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.inbound_secs)))
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Router, for serving or driving in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Config updates replace the provider set and the caller table.
    /// All background tasks stop when `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let selector = self.dispatcher.selector().clone();
        selector.registry().refresh().await;

        let monitor = HealthMonitor::new(
            selector.registry().clone(),
            selector.health().clone(),
            self.config.health_check.clone(),
        );
        tokio::spawn(monitor.run(shutdown.resubscribe()));

        let registry = selector.registry().clone();
        let authenticator = self.authenticator.clone();
        let client = self.client.clone();
        let mut reload_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => {
                        let Some(config) = update else { break };
                        registry.replace_providers(ConfigProvider::all_from_config(&config, &client));
                        authenticator.reload(&config.callers);
                        tracing::info!(
                            providers = config.providers.len(),
                            callers = config.callers.len(),
                            "Configuration reloaded"
                        );
                    }
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
