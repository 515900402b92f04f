//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, body limit, timeout, trace)
//!     → handlers.rs (auth, permissions, endpoint dispatch)
//!         → request.rs (bearer, validation context, call options, JSON body)
//!     → Dispatcher (buffered forward or SSE relay)
//!     → response.rs (pass-through, SSE, JSON errors)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
