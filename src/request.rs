//! The per-call request context handed to every endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{AUTHORIZATION, AsHeaderName, CONTENT_TYPE, IntoHeaderName};
use http::request::Parts;
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::metadata::{Key, Metadata};

/// An incoming request, matched to a route and fully buffered.
///
/// Cloning is cheap and every clone refers to the same request: a value a
/// middleware stores with [`set`](Request::set) is visible to the endpoint
/// and to that middleware's post-call logic.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

struct Inner {
    parts: Parts,
    body: Bytes,
    route: Arc<str>,
    params: HashMap<String, String>,
    meta: Metadata,
    response: Mutex<ResponseParts>,
}

/// Response adjustments an endpoint makes while it runs.
#[derive(Debug, Default)]
pub(crate) struct ResponseParts {
    pub(crate) status: Option<StatusCode>,
    pub(crate) headers: HeaderMap,
}

impl Request {
    pub(crate) fn new(
        parts: Parts,
        body: Bytes,
        route: Arc<str>,
        params: HashMap<String, String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                parts,
                body,
                route,
                params,
                meta: Metadata::new(),
                response: Mutex::new(ResponseParts::default()),
            }),
        }
    }

    pub fn method(&self) -> &Method { &self.inner.parts.method }
    pub fn uri(&self) -> &Uri { &self.inner.parts.uri }
    pub fn path(&self) -> &str { self.inner.parts.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.inner.parts.headers }
    pub fn body(&self) -> &Bytes { &self.inner.body }

    /// The raw request head, for anything the accessors do not cover.
    pub fn parts(&self) -> &Parts { &self.inner.parts }

    /// The route pattern this request matched, as registered
    /// (e.g. `/users/{id}`), not the concrete path.
    pub fn route(&self) -> &str {
        &self.inner.route
    }

    /// Case-insensitive header lookup. Values that are not visible ASCII
    /// are treated as absent.
    pub fn header(&self, name: impl AsHeaderName) -> Option<&str> {
        self.inner.parts.headers.get(name)?.to_str().ok()
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.inner.params
    }

    /// Returns the first query-string value for `name`, percent-decoded.
    pub fn query(&self, name: &str) -> Option<String> {
        let query = self.inner.parts.uri.query()?;
        serde_urlencoded::from_str::<Vec<(String, String)>>(query)
            .ok()?
            .into_iter()
            .find_map(|(k, v)| (k == name).then_some(v))
    }

    /// Username and password from an `Authorization: Basic …` header.
    pub fn basic_auth(&self) -> Option<(String, String)> {
        let value = self.header(AUTHORIZATION)?;
        let (scheme, encoded) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some((username.to_owned(), password.to_owned()))
    }

    /// Decodes the body into `T`.
    ///
    /// `application/x-www-form-urlencoded` bodies are decoded as forms,
    /// everything else as JSON. Failures become a `400 bad_request` whose
    /// message carries the decoder's position, with the decoder error
    /// wrapped as the cause.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let body = &self.inner.body;
        if self.is_form() {
            return serde_urlencoded::from_bytes(body).map_err(|e| {
                Error::bad_request(format!("malformed or unexpected form: {e}")).wrap(e)
            });
        }
        serde_json::from_slice(body).map_err(|e| {
            let details = json_error_details(body, &e);
            Error::bad_request(format!("malformed or unexpected json: {details}")).wrap(e)
        })
    }

    /// Sets a header on the eventual response, success or error.
    pub fn set_response_header(&self, name: impl IntoHeaderName, value: HeaderValue) {
        self.inner.response.lock().headers.insert(name, value);
    }

    /// Overrides the `200 OK` a successful outcome is rendered with.
    /// Error outcomes always use the error's own status.
    pub fn set_response_status(&self, status: StatusCode) {
        self.inner.response.lock().status = Some(status);
    }

    pub fn metadata(&self) -> &Metadata {
        &self.inner.meta
    }

    pub fn get<T: Send + Sync + 'static>(&self, key: &Key<T>) -> Option<Arc<T>> {
        self.inner.meta.get(key)
    }

    pub fn set<T: Send + Sync + 'static>(&self, key: &Key<T>, value: T) {
        self.inner.meta.set(key, value);
    }

    pub fn contains<T: 'static>(&self, key: &Key<T>) -> bool {
        self.inner.meta.contains(key)
    }

    pub(crate) fn take_response_parts(&self) -> ResponseParts {
        std::mem::take(&mut *self.inner.response.lock())
    }

    fn is_form(&self) -> bool {
        self.header(CONTENT_TYPE)
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
    }

    #[cfg(test)]
    pub(crate) fn stub() -> Self {
        Self::from_http(http::Request::new(Bytes::new()), "/", HashMap::new())
    }

    #[cfg(test)]
    pub(crate) fn from_http(
        req: http::Request<Bytes>,
        route: &str,
        params: HashMap<String, String>,
    ) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(parts, body, Arc::from(route), params)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", self.method())
            .field("uri", self.uri())
            .field("route", &self.route())
            .field("params", self.params())
            .finish_non_exhaustive()
    }
}

/// `offset N: message`, where `N` is the byte offset the decoder stopped at.
fn json_error_details(body: &[u8], err: &serde_json::Error) -> String {
    let message = err.to_string();
    if err.line() == 0 {
        return message;
    }
    let position = format!(" at line {} column {}", err.line(), err.column());
    let message = message.strip_suffix(&position).unwrap_or(&message);
    format!("offset {}: {message}", byte_offset(body, err.line(), err.column()))
}

fn byte_offset(body: &[u8], line: usize, column: usize) -> usize {
    let preceding: usize = body
        .split(|b| *b == b'\n')
        .take(line.saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum();
    preceding + column
}
