//! Backend registry subsystem.
//!
//! # Data Flow
//! ```text
//! [[providers]] config
//!     → provider.rs (ConfigProvider → HttpBackend handles)
//!     → pool.rs (enumerate, resolve model lists, assign BackendId)
//!     → backend.rs (BackendDescriptor + handle = PoolEntry)
//!     → Selector reads candidates_for_model(model, exclude)
//!
//! On config reload:
//!     replace_providers() marks the pool stale
//!     → next request rebuilds it
//! ```
//!
//! # Design Decisions
//! - The pool is replaced wholesale, never edited in place
//! - Backend ids are content hashes so health and stats outlive refreshes

pub mod backend;
pub mod pool;
pub mod provider;

pub use backend::{BackendDescriptor, BackendId, PoolEntry};
pub use pool::BackendRegistry;
pub use provider::{BackendHandle, ConfigProvider, HttpBackend, ProviderError, ProviderSource};
