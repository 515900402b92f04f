//! Backend selection subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher asks for a backend (SelectionContext: model, exclude, budget)
//!     → engine.rs refresh pool if stale
//!     → registry candidates_for_model(model, exclude)
//!     → strategy picks one:
//!         - random.rs (uniform, default)
//!         - round_robin.rs (rotate through candidates)
//!     → select_with_fallback checks health + failure streak
//!     → Return backend or None (caller answers 503)
//! ```
//!
//! # Design Decisions
//! - Strategies are stateless with respect to health; the engine filters
//! - Unknown strategy names resolve to random
//! - The fallback loop is local-state only, no network I/O

use std::sync::Arc;

use crate::registry::PoolEntry;

pub mod context;
pub mod engine;
pub mod random;
pub mod round_robin;

pub use context::SelectionContext;
pub use engine::{PoolStatus, Selector};
pub use random::RandomStrategy;
pub use round_robin::RoundRobin;

/// Picks one backend out of a non-empty candidate set.
pub trait SelectionStrategy: Send + Sync {
    fn select(&self, candidates: &[Arc<PoolEntry>], ctx: &SelectionContext) -> Option<Arc<PoolEntry>>;
}
