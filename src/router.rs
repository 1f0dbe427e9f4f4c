//! Route registration and middleware composition.
//!
//! A [`Router`] is one node in a tree. [`Router::group`] makes a child node;
//! every node has its own middleware list and shares one routing table
//! (a `matchit` radix tree per HTTP method) with the rest of the tree.
//!
//! # Middleware order
//!
//! When a route is first dispatched its endpoint is wrapped by walking from
//! the node it was registered on up to the root, applying each node's
//! middleware last-registered first. The result, at request time:
//!
//! - ancestors run outside descendants;
//! - within one node, the first registered middleware sees the request first;
//! - sibling groups never see each other's routes.
//!
//! ```text
//! root.use(M1)            M1 pre
//! api = root.group()        M2 pre
//! api.use(M2)                 E
//! api.get("/x", E)          M2 post
//!                         M1 post
//! ```
//!
//! Composition is deferred to first dispatch and then cached per route, so
//! middleware added to any ancestor before the server starts applies to
//! routes registered earlier on a child.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use http::Method;
use matchit::Router as MatchitRouter;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dispatch::Dispatcher;
use crate::endpoint::{self, Endpoint, Middleware};
use crate::error::BoxError;
use crate::options::{NotFoundHandler, Options};
use crate::request::Request;

/// A node in the route-group tree.
///
/// Cloning yields another handle to the same node.
#[derive(Clone)]
pub struct Router {
    node: Arc<Node>,
    table: Arc<Table>,
}

struct Node {
    middleware: RwLock<Vec<Middleware>>,
    parent: Option<Arc<Node>>,
    dump_errors: bool,
}

/// State shared by every node of one tree.
struct Table {
    routes: Mutex<HashMap<Method, MatchitRouter<Arc<Route>>>>,
    not_found: Option<NotFoundHandler>,
    dump_errors: bool,
}

/// A registered endpoint and the node it was registered on.
pub(crate) struct Route {
    pattern: Arc<str>,
    endpoint: Endpoint,
    node: Arc<Node>,
    composed: OnceLock<Endpoint>,
}

impl Router {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        let Options { dump_errors, not_found } = options;
        Self {
            node: Arc::new(Node {
                middleware: RwLock::new(Vec::new()),
                parent: None,
                dump_errors,
            }),
            table: Arc::new(Table {
                routes: Mutex::new(HashMap::new()),
                not_found,
                dump_errors,
            }),
        }
    }

    /// Creates a child group. It has its own middleware and inherits its
    /// ancestors' middleware, which always runs outside its own.
    pub fn group(&self) -> Router {
        Router {
            node: Arc::new(Node {
                middleware: RwLock::new(Vec::new()),
                parent: Some(Arc::clone(&self.node)),
                dump_errors: self.node.dump_errors,
            }),
            table: Arc::clone(&self.table),
        }
    }

    /// Appends a middleware to this group. Returns `self` for chaining.
    pub fn use_middleware<M>(&self, middleware: M) -> &Self
    where
        M: Fn(Endpoint) -> Endpoint + Send + Sync + 'static,
    {
        self.node.middleware.write().push(endpoint::middleware(middleware));
        self
    }

    /// Appends several middleware, in order.
    pub fn use_all(&self, middleware: impl IntoIterator<Item = Middleware>) -> &Self {
        self.node.middleware.write().extend(middleware);
        self
    }

    /// Registers a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` (or `:name`) syntax, catch-alls `{*name}`
    /// (or `*name`).
    ///
    /// # Panics
    ///
    /// Panics if the path is invalid or conflicts with an existing route.
    pub fn handle<F, Fut, T, E>(&self, method: Method, path: &str, handler: F) -> &Self
    where
        F: Fn(CancellationToken, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.handle_endpoint(method, path, endpoint::handler(handler))
    }

    /// Registers an already type-erased endpoint.
    ///
    /// # Panics
    ///
    /// Same as [`handle`](Router::handle).
    pub fn handle_endpoint(&self, method: Method, path: &str, endpoint: Endpoint) -> &Self {
        let route = Arc::new(Route {
            pattern: Arc::from(path),
            endpoint,
            node: Arc::clone(&self.node),
            composed: OnceLock::new(),
        });
        debug!(%method, path, "registering route");
        self.table
            .routes
            .lock()
            .entry(method)
            .or_default()
            .insert(normalize_path(path), route)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Registers every `("METHOD path", endpoint)` entry.
    ///
    /// ```rust
    /// use jsonrest::{Router, handler};
    /// # async fn ping(_: tokio_util::sync::CancellationToken, _: jsonrest::Request) -> Result<&'static str, jsonrest::Error> { Ok("pong") }
    ///
    /// Router::new().routes([
    ///     ("GET  /ping",       handler(ping)),
    ///     ("HEAD /api/check",  handler(ping)),
    /// ]);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if a key does not split on whitespace into exactly a method and
    /// a path, or if any route is invalid.
    pub fn routes<K>(&self, entries: impl IntoIterator<Item = (K, Endpoint)>) -> &Self
    where
        K: AsRef<str>,
    {
        for (key, endpoint) in entries {
            let key = key.as_ref();
            let (method, path) = parse_route_key(key)
                .unwrap_or_else(|| panic!("invalid route map entry: {key:?}"));
            self.handle_endpoint(method, path, endpoint);
        }
        self
    }

    /// Freezes the routing table into a [`Dispatcher`].
    ///
    /// Routes registered after this call are not seen by the returned
    /// dispatcher.
    pub fn build(&self) -> Dispatcher {
        let routes = self.table.routes.lock().clone();
        Dispatcher::new(routes, self.table.not_found.clone(), self.table.dump_errors)
    }

    pub fn dump_errors(&self) -> bool {
        self.node.dump_errors
    }
}

macro_rules! method_shortcut {
    ($($name:ident => $method:ident),* $(,)?) => {
        impl Router {
            $(
                #[doc = concat!("Shortcut for `handle(Method::", stringify!($method), ", path, handler)`.")]
                pub fn $name<F, Fut, T, E>(&self, path: &str, handler: F) -> &Self
                where
                    F: Fn(CancellationToken, Request) -> Fut + Send + Sync + 'static,
                    Fut: Future<Output = Result<T, E>> + Send + 'static,
                    T: Serialize + Send + 'static,
                    E: Into<BoxError> + Send + 'static,
                {
                    self.handle(Method::$method, path, handler)
                }
            )*
        }
    };
}

method_shortcut! {
    get    => GET,
    head   => HEAD,
    post   => POST,
    put    => PUT,
    patch  => PATCH,
    delete => DELETE,
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("middleware", &self.node.middleware.read().len())
            .field("depth", &self.node.depth())
            .field("dump_errors", &self.node.dump_errors)
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Wraps `endpoint` in this node's and every ancestor's middleware.
    fn compose(&self, endpoint: Endpoint) -> Endpoint {
        let mut composed = endpoint;
        let mut node = Some(self);
        while let Some(current) = node {
            let middleware = current.middleware.read().clone();
            for middleware in middleware.iter().rev() {
                composed = middleware(composed);
            }
            node = current.parent.as_deref();
        }
        composed
    }

    fn depth(&self) -> usize {
        let mut depth = 0;
        let mut node = self.parent.as_deref();
        while let Some(current) = node {
            depth += 1;
            node = current.parent.as_deref();
        }
        depth
    }
}

impl Route {
    /// The fully composed endpoint, built on first use.
    pub(crate) fn endpoint(&self) -> Endpoint {
        let composed = self
            .composed
            .get_or_init(|| self.node.compose(Arc::clone(&self.endpoint)));
        Arc::clone(composed)
    }

    pub(crate) fn pattern(&self) -> &Arc<str> {
        &self.pattern
    }

    pub(crate) fn dump_errors(&self) -> bool {
        self.node.dump_errors
    }
}

/// Splits `"GET /users"` into its method and path.
fn parse_route_key(key: &str) -> Option<(Method, &str)> {
    let mut parts = key.split_whitespace();
    let (method, path) = (parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let method = Method::from_bytes(method.as_bytes()).ok()?;
    Some((method, path))
}

/// Rewrites `:name` and `*name` segments into `matchit`'s `{name}` and
/// `{*name}` syntax.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{name}}}")
            } else if let Some(name) = segment.strip_prefix('*') {
                format!("{{*{name}}}")
            } else {
                segment.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
