//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, OPENAI_PROXY_* overrides)
//!     → validation.rs (semantic checks, all errors at once)
//!     → ProxyConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates
//!     → channel to the server
//!     → registry providers and caller table swapped
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{apply_env_overrides, load_config, ConfigError};
pub use schema::{
    BackendConfig, CallerConfig, HealthCheckConfig, ListenerConfig, ObservabilityConfig, PoolConfig, ProviderConfig,
    ProxyConfig, RetryConfig, SecurityConfig, SelectionConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
