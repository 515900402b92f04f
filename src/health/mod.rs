//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Passive (dispatch/selector):
//!     Candidate rejected or request failed
//!     → state.rs mark_unhealthy(id, reason)
//!
//! Active (active.rs, optional):
//!     Periodic timer
//!     → probe each pooled backend (availability + balance)
//!     → state.rs active_probe records outcome and latency
//!
//! Reads (selector):
//!     is_healthy(id) with lazy cool-down expiry
//! ```
//!
//! # Design Decisions
//! - Health state is per-backend, keyed by BackendId
//! - Recovery is optimistic: the cool-down simply runs out

pub mod active;
pub mod state;

pub use active::HealthMonitor;
pub use state::{HealthRecord, HealthTracker, HealthView};
