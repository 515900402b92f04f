//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Handler (authenticated, JSON payload)
//!     → forward.rs Dispatcher
//!         → Selector::select_with_fallback(model)
//!         → outbound.rs (URL join, provider auth headers)
//!         → reqwest call (buffered) ─┐
//!         → relay.rs (streamed SSE) ─┴→ Stats/Usage update
//!     → UpstreamResponse / SSE frames back to the handler
//! ```
//!
//! # Design Decisions
//! - Retry is an explicit loop with an accumulating exclusion set
//! - Upstream bodies are passed through, never re-validated
//! - Streams are never retried once started

pub mod forward;
pub mod outbound;
pub mod relay;

pub use forward::{CallOptions, Dispatcher, UpstreamResponse};
pub use relay::{ChannelSink, EventSink, RelayOutcome, SinkClosed, StreamRelay};
