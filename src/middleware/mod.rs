//! Built-in middleware.
//!
//! Middleware wraps endpoints and is the right place for cross-cutting
//! concerns: structured tracing, request-id propagation, authentication.
//! Register it on a [`Router`](crate::Router) or any group:
//!
//! ```rust
//! use jsonrest::{Router, middleware};
//!
//! let app = Router::new();
//! app.use_middleware(middleware::request_id())
//!    .use_middleware(middleware::trace());
//! ```
//!
//! - [`trace`]: per-request span with method and route, logs latency and failures
//! - [`request_id`]: echoes or generates `x-request-id`, exposes it as [`REQUEST_ID`]

mod request_id;
mod trace;

pub use request_id::{REQUEST_ID, X_REQUEST_ID, request_id};
pub use trace::trace;
