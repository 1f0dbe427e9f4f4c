//! # jsonrest
//!
//! A small JSON REST layer for Rust services.
//!
//! Every endpoint has the same shape: a [`CancellationToken`] and a
//! [`Request`] in, a serialisable value or an error out. jsonrest turns the
//! result into a JSON response, translates errors into a stable envelope,
//! and contains panics to the request that raised them.
//!
//! ## What it owns
//!
//! - Middleware composition over nested route groups
//! - The error model and its JSON rendering (`{"error": {"code", "message"}}`)
//! - Per-request context: params, query, headers, body binding, metadata
//! - Panic recovery and not-found handling
//!
//! Path matching is [`matchit`]; transport is hyper on tokio.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use jsonrest::{Error, Request, Router, Server, middleware};
//! use serde_json::{Value, json};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), jsonrest::ServeError> {
//!     let app = Router::new();
//!     app.use_middleware(middleware::trace());
//!     app.get("/hello", hello);
//!
//!     let api = app.group();
//!     api.get("/customers/:id", get_customer);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn hello(_cx: CancellationToken, _req: Request) -> Result<Value, Error> {
//!     Ok(json!({"hello": "world"}))
//! }
//!
//! async fn get_customer(_cx: CancellationToken, req: Request) -> Result<Value, Error> {
//!     let id = req.param("id").unwrap_or_default();
//!     Err(Error::new(StatusCode::NOT_FOUND, "customer_not_found", "customer not found")
//!         .with_detail(format!("id {id}")))
//! }
//! ```

mod dispatch;
mod endpoint;
mod error;
mod metadata;
mod options;
mod render;
mod request;
mod router;
mod server;

pub mod health;
pub mod middleware;

pub use dispatch::Dispatcher;
pub use endpoint::{BoxFuture, Endpoint, Middleware, Outcome, endpoint, handler, middleware};
pub use error::{BoxError, Error, ServeError};
pub use metadata::{Key, Metadata};
pub use options::{NotFoundHandler, Options};
pub use render::{JSON_CONTENT_TYPE, ResponseBody};
pub use request::Request;
pub use router::Router;
pub use server::Server;
pub use tokio_util::sync::CancellationToken;
