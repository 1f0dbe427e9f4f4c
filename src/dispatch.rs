//! Request dispatch: route lookup, the recovery boundary, rendering.
//!
//! This is the only place panics are caught. Everything below it (router
//! composition, middleware, endpoints) speaks `Result`; everything above it
//! (the server) only ever sees a finished response.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};

use bytes::Bytes;
use futures::FutureExt;
use http::request::Parts;
use http::{Method, Response};
use http_body_util::BodyExt;
use hyper::body::Body;
use matchit::Router as MatchitRouter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{BoxError, Error};
use crate::options::NotFoundHandler;
use crate::render::{self, ResponseBody};
use crate::request::{Request, ResponseParts};
use crate::router::Route;

/// A frozen routing table, ready to serve.
///
/// Obtained from [`Router::build`](crate::Router::build). Shared read-only
/// across every in-flight request.
pub struct Dispatcher {
    routes: HashMap<Method, MatchitRouter<Arc<Route>>>,
    not_found: Option<NotFoundHandler>,
    dump_errors: bool,
}

impl Dispatcher {
    pub(crate) fn new(
        routes: HashMap<Method, MatchitRouter<Arc<Route>>>,
        not_found: Option<NotFoundHandler>,
        dump_errors: bool,
    ) -> Self {
        install_panic_hook();
        Self { routes, not_found, dump_errors }
    }

    /// Routes one request and produces one response. Never fails: every
    /// error, and every panic, becomes a JSON error response.
    pub async fn dispatch<B>(&self, req: http::Request<B>) -> Response<ResponseBody>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        self.dispatch_with(req, CancellationToken::new()).await
    }

    /// Like [`dispatch`](Dispatcher::dispatch), threading `cancel` through
    /// to every middleware and the endpoint.
    pub async fn dispatch_with<B>(
        &self,
        req: http::Request<B>,
        cancel: CancellationToken,
    ) -> Response<ResponseBody>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let e: BoxError = e.into();
                warn!(method = %parts.method, uri = %parts.uri, "failed to read request body: {e}");
                let err = Error::bad_request("cannot read request body").wrap(e);
                return render::failure(&err, self.dump_errors);
            }
        };

        let Some((route, params)) = self.lookup(&parts.method, parts.uri.path()) else {
            return self.not_found(parts, body).await;
        };

        let dump_errors = route.dump_errors();
        let req = Request::new(parts, body, Arc::clone(route.pattern()), params);

        // Composition runs inside the boundary too: middleware constructors
        // are application code.
        let call = AssertUnwindSafe(async {
            let endpoint = route.endpoint();
            endpoint(cancel, req.clone()).await
        });

        match call.catch_unwind().await {
            Ok(outcome) => render::outcome(outcome, req.take_response_parts(), dump_errors),
            Err(payload) => {
                let site = take_panic_site();
                error!(
                    method = %req.method(),
                    uri = %req.uri(),
                    route = req.route(),
                    panic = panic_message(&*payload),
                    location = %site.location,
                    backtrace = %site.backtrace,
                    "panic serving request"
                );
                render::panicked(req.take_response_parts())
            }
        }
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(&Arc<Route>, HashMap<String, String>)> {
        let matched = self.routes.get(method)?.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value, params))
    }

    async fn not_found(&self, parts: Parts, body: Bytes) -> Response<ResponseBody> {
        debug!(method = %parts.method, path = parts.uri.path(), "no route matched");
        let Some(handler) = &self.not_found else {
            return render::failure(&Error::not_found("url not found"), self.dump_errors);
        };

        let uri = parts.uri.clone();
        match AssertUnwindSafe(handler(http::Request::from_parts(parts, body)))
            .catch_unwind()
            .await
        {
            Ok(response) => response,
            Err(payload) => {
                let site = take_panic_site();
                error!(
                    %uri,
                    panic = panic_message(&*payload),
                    location = %site.location,
                    backtrace = %site.backtrace,
                    "panic in not-found handler"
                );
                render::panicked(ResponseParts::default())
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("methods", &self.routes.keys().collect::<Vec<_>>())
            .field("custom_not_found", &self.not_found.is_some())
            .field("dump_errors", &self.dump_errors)
            .finish()
    }
}

/// Where the last panic on this thread was raised, recorded by the hook
/// before unwinding starts.
struct PanicSite {
    location: String,
    backtrace: Backtrace,
}

thread_local! {
    // A panic and the `catch_unwind` that stops it run in the same poll,
    // so they always share a thread.
    static LAST_PANIC: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

/// Chains a hook in front of the current one that records the panic site.
/// Installed once per process.
fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let site = PanicSite {
                location: info
                    .location()
                    .map_or_else(|| "unknown".to_owned(), ToString::to_string),
                backtrace: Backtrace::force_capture(),
            };
            let _ = LAST_PANIC.try_with(|slot| *slot.borrow_mut() = Some(site));
            previous(info);
        }));
    });
}

fn take_panic_site() -> PanicSite {
    LAST_PANIC
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| PanicSite {
            location: "unknown".to_owned(),
            backtrace: Backtrace::disabled(),
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
