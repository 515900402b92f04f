//! `llm-pool-proxy` server binary.
//!
//! ```text
//! args → config (file or defaults, env overrides)
//!      → logging + metrics
//!      → bind listener
//!      → config watcher (when a file is given)
//!      → HttpServer::run until Ctrl+C / SIGTERM
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use llm_pool_proxy::config::{apply_env_overrides, load_config, validate_config, ConfigError, ConfigWatcher};
use llm_pool_proxy::lifecycle::shutdown_signal;
use llm_pool_proxy::observability::{init_logging, init_metrics};
use llm_pool_proxy::{HttpServer, ProxyConfig, Shutdown};

#[derive(Parser)]
#[command(name = "llm-pool-proxy", version, about = "Load-balancing proxy for OpenAI-compatible backends")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "OPENAI_PROXY_CONFIG")]
    config: Option<PathBuf>,
}

fn initial_config(path: Option<&PathBuf>) -> Result<ProxyConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let mut config = ProxyConfig::default();
            apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = initial_config(args.config.as_ref())?;

    init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "llm-pool-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        providers = config.providers.len(),
        callers = config.callers.len(),
        strategy = %config.selection.strategy,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    // The watcher handle must outlive the server.
    let (_watcher, config_updates) = match args.config.as_ref() {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(handle), updates),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload disabled");
                    (None, updates)
                }
            }
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    let server_task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    shutdown_signal().await;
    shutdown.trigger();

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
