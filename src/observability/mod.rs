//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG or the configured level)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Metric updates go through the `metrics` facade; with no recorder
//!   installed they are no-ops, so tests need no setup
//! - Request ID flows through the trace layer via `x-request-id`

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
