//! Outcome → HTTP response.
//!
//! Success values are written as-is. Errors are written inside the envelope
//!
//! ```text
//! {"error": {"code": "...", "message": "...", "details": ["..."]}}
//! ```
//!
//! where `details` only ever appears when the router dumps errors.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use tracing::error;

use crate::endpoint::Outcome;
use crate::error::Error;
use crate::request::ResponseParts;

/// Body type of every response this crate produces.
pub type ResponseBody = Full<Bytes>;

/// `Content-Type` of every response this crate renders.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

// Last resort when even the envelope fails to encode.
const UNKNOWN_ERROR_BODY: &str = "{\n  \"error\": {\n    \"code\": \"unknown_error\",\n    \"message\": \"an unknown error occurred\"\n  }\n}\n";

#[derive(Serialize)]
struct Envelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<String>,
}

/// Renders what an endpoint returned, applying the response adjustments it
/// made through its [`Request`](crate::Request).
pub(crate) fn outcome(outcome: Outcome, parts: ResponseParts, dump_errors: bool) -> Response<ResponseBody> {
    let mut response = match outcome {
        Ok(value) => json(parts.status.unwrap_or(StatusCode::OK), &value),
        Err(err) => failure(&*err, dump_errors),
    };
    let headers = response.headers_mut();
    headers.extend(parts.headers);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    response
}

/// Renders any error. Structured errors (found anywhere in the source
/// chain) keep their status and code; everything else is a 500
/// `unknown_error`.
pub(crate) fn failure(err: &(dyn std::error::Error + 'static), dump_errors: bool) -> Response<ResponseBody> {
    let (status, body) = match Error::find(err) {
        Some(e) => {
            let details = if dump_errors {
                e.details()
                    .iter()
                    .cloned()
                    .chain(e.cause().map(ToString::to_string))
                    .collect()
            } else {
                Vec::new()
            };
            (e.status(), ErrorBody { code: e.code(), message: e.message(), details })
        }
        None => {
            let details = if dump_errors { vec![err.to_string()] } else { Vec::new() };
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody { code: "unknown_error", message: "an unknown error occurred", details },
            )
        }
    };
    json(status, &Envelope { error: body })
}

/// The response for a contained panic. Never carries details.
pub(crate) fn panicked(parts: ResponseParts) -> Response<ResponseBody> {
    outcome(Err(Error::unknown().into()), parts, false)
}

/// Pretty-printed JSON with a two-space indent and a trailing newline.
pub(crate) fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    match serde_json::to_vec_pretty(value) {
        Ok(mut body) => {
            body.push(b'\n');
            build(status, Bytes::from(body))
        }
        Err(e) => {
            error!("failed to encode response body: {e}");
            build(StatusCode::INTERNAL_SERVER_ERROR, Bytes::from_static(UNKNOWN_ERROR_BODY.as_bytes()))
        }
    }
}

fn build(status: StatusCode, body: Bytes) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    response
}
