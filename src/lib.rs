//! Load-balancing proxy in front of a pool of OpenAI-compatible backends.
//!
//! # Data Flow
//! ```text
//! Client → http (auth, permissions, parsing)
//!        → dispatch (forward loop / SSE relay)
//!        → selector (health + stats filtered candidates, strategy)
//!        → registry (providers → pooled backends)
//!        → upstream backend
//!
//! Outcomes flow back into:
//!     health (unhealthy marks, cooldown)
//!     stats (per-backend counters, consecutive failures)
//!     usage (per backend/model summary)
//! ```

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod selector;
pub mod stats;

pub use config::ProxyConfig;
pub use dispatch::Dispatcher;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
