//! Request statistics subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher finishes an upstream call
//!     → tracker.rs record_request(id, latency, success)
//!         → consecutive-failure streak read by the Selector
//!     → usage.rs record(backend, model, status, latency)
//!         → reported by the status endpoint
//! ```

pub mod tracker;
pub mod usage;

pub use tracker::{StatsRecord, StatsTracker};
pub use usage::{UsageSummary, UsageTracker};
