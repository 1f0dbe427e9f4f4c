//! Error types.
//!
//! [`Error`] is what endpoints return when a request fails in a way the
//! caller should see: a status, a stable machine-readable code, a message.
//! Anything else an endpoint returns is treated as an internal failure and
//! rendered as a generic `500 unknown_error`.
//!
//! [`ServeError`] covers the infrastructure side: binding the listener.

use std::borrow::Cow;

use http::StatusCode;

/// Any error an endpoint may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A structured HTTP error.
///
/// The `code` is part of the API contract: clients match on it, so keep it
/// stable for a given failure class.
///
/// ```rust
/// use http::StatusCode;
/// use jsonrest::Error;
///
/// let err = Error::new(StatusCode::NOT_FOUND, "customer_not_found", "customer not found");
/// assert_eq!(err.status(), StatusCode::NOT_FOUND);
/// assert_eq!(err.code(), "customer_not_found");
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    status: StatusCode,
    code: Cow<'static, str>,
    message: String,
    details: Vec<String>,
    #[source]
    cause: Option<BoxError>,
}

impl Error {
    pub fn new(
        status: StatusCode,
        code: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: Vec::new(),
            cause: None,
        }
    }

    /// `400 bad_request`
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    /// `401 unauthorized`
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    /// `403 forbidden`
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    /// `404 not_found`
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    /// `409 conflict`
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    /// `422 unprocessable_entity`
    pub fn unprocessable_entity(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_entity", message)
    }

    /// `500 internal_error`
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    /// The generic failure every unrecognised error and every panic collapses to.
    pub fn unknown() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "unknown_error",
            "an unknown error occurred",
        )
    }

    /// Attaches the underlying cause. Its message is only ever shown to
    /// clients when the router dumps errors.
    pub fn wrap(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Adds a diagnostic line, rendered only when the router dumps errors.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &[String] {
        &self.details
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Finds a structured error in `err` or anywhere in its `source()` chain.
    pub(crate) fn find<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a Error> {
        let mut current = Some(err);
        while let Some(e) = current {
            if let Some(found) = e.downcast_ref::<Error>() {
                return Some(found);
            }
            current = e.source();
        }
        None
    }
}

/// Infrastructure failures from [`Server::serve`](crate::Server::serve).
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("invalid socket address `{addr}`: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
