//! Endpoints, middleware, and type erasure.
//!
//! # How endpoints are stored
//!
//! Routes hold handlers of *different* concrete types, so every handler is
//! erased into one shape before the router sees it:
//!
//! ```text
//! async fn hello(cx, req) -> Result<T, E>        ← user writes this
//!        ↓ router.get("/", hello)
//! handler(hello)                                 ← serialises T, boxes E
//!        ↓
//! Endpoint = Arc<dyn Fn(CancellationToken, Request) -> BoxFuture<Outcome>>
//!        ↓ middleware: Fn(Endpoint) -> Endpoint
//! composed endpoint, called once per request
//! ```
//!
//! A [`Middleware`] is a plain decorator: it receives the endpoint it wraps
//! and returns a new one. Pre-call logic runs before awaiting `next`,
//! post-call logic after.
//!
//! ```rust
//! use std::sync::Arc;
//! use jsonrest::{Endpoint, Router, endpoint};
//!
//! let router = Router::new();
//! router.use_middleware(|next: Endpoint| {
//!     endpoint(move |cx, req| {
//!         let next = Arc::clone(&next);
//!         async move {
//!             let started = std::time::Instant::now();
//!             let out = next(cx, req.clone()).await;
//!             tracing::info!(route = req.route(), elapsed = ?started.elapsed());
//!             out
//!         }
//!     })
//! });
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;
use crate::request::Request;

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` lets tokio move it across worker threads.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// What every endpoint resolves to: a JSON value, or an error for the
/// renderer to translate.
pub type Outcome = Result<Value, BoxError>;

/// A type-erased endpoint shared across concurrent requests.
pub type Endpoint = Arc<dyn Fn(CancellationToken, Request) -> BoxFuture<Outcome> + Send + Sync>;

/// Decorates an endpoint with cross-cutting behaviour.
pub type Middleware = Arc<dyn Fn(Endpoint) -> Endpoint + Send + Sync>;

/// Erases an async function that already speaks [`Outcome`].
///
/// This is the building block for middleware, which pass values through
/// without re-serialising them.
pub fn endpoint<F, Fut>(f: F) -> Endpoint
where
    F: Fn(CancellationToken, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    Arc::new(move |cx: CancellationToken, req: Request| -> BoxFuture<Outcome> {
        Box::pin(f(cx, req))
    })
}

/// Erases an application handler.
///
/// The handler may return any serialisable value and any error convertible
/// into a [`BoxError`], including [`Error`](crate::Error) and `anyhow::Error`.
/// A value that fails to serialise becomes an internal error.
pub fn handler<F, Fut, T, E>(f: F) -> Endpoint
where
    F: Fn(CancellationToken, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Serialize + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    Arc::new(move |cx: CancellationToken, req: Request| -> BoxFuture<Outcome> {
        let fut = f(cx, req);
        Box::pin(async move {
            let value = fut.await.map_err(Into::<BoxError>::into)?;
            serde_json::to_value(value).map_err(BoxError::from)
        })
    })
}

/// Erases a decorator into a [`Middleware`].
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(Endpoint) -> Endpoint + Send + Sync + 'static,
{
    Arc::new(f)
}
