//! Router construction options.
//!
//! ## Environment variables
//!
//! [`Options::from_env`] reads:
//!
//! ### `JSONREST_DUMP_ERRORS`
//!
//! `1`, `true`, `yes` or `on` (any case) include wrapped-cause messages in
//! error responses as `details`. Meant for local debugging only.
//!
//! Default: off.

use std::env;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http::Response;
use tracing::warn;

use crate::endpoint::BoxFuture;
use crate::render::ResponseBody;

pub(crate) const DUMP_ERRORS_ENV: &str = "JSONREST_DUMP_ERRORS";

/// Replaces the default `404 not_found` for unmatched requests.
///
/// It receives the raw request and its response is sent unmodified.
pub type NotFoundHandler =
    Arc<dyn Fn(http::Request<Bytes>) -> BoxFuture<Response<ResponseBody>> + Send + Sync>;

/// Options recognised by [`Router::with_options`](crate::Router::with_options).
#[derive(Clone, Default)]
pub struct Options {
    pub(crate) dump_errors: bool,
    pub(crate) not_found: Option<NotFoundHandler>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, overridden by the environment.
    pub fn from_env() -> Self {
        let dump_errors = match env::var(DUMP_ERRORS_ENV) {
            Ok(val) => parse_flag(&val).unwrap_or_else(|| {
                warn!(value = %val, "ignoring unrecognised {DUMP_ERRORS_ENV}");
                false
            }),
            Err(_) => false,
        };
        Self { dump_errors, not_found: None }
    }

    /// Include wrapped-cause messages in error responses. Never changes
    /// status codes or error codes, only the presence of `details`.
    pub fn dump_errors(mut self, enabled: bool) -> Self {
        self.dump_errors = enabled;
        self
    }

    pub fn not_found<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(http::Request<Bytes>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response<ResponseBody>> + Send + 'static,
    {
        self.not_found = Some(Arc::new(
            move |req: http::Request<Bytes>| -> BoxFuture<Response<ResponseBody>> {
                Box::pin(handler(req))
            },
        ));
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("dump_errors", &self.dump_errors)
            .field("not_found", &self.not_found.as_ref().map(|_| "custom"))
            .finish()
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
