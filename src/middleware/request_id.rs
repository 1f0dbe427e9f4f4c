use std::sync::Arc;

use http::{HeaderName, HeaderValue};
use uuid::Uuid;

use crate::endpoint::{Endpoint, endpoint};
use crate::metadata::Key;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Where [`request_id`] stores the id for downstream middleware and endpoints.
pub const REQUEST_ID: Key<String> = Key::new("request_id");

const MAX_LEN: usize = 128;

/// Reuses the caller's `x-request-id` when it looks sane, otherwise
/// generates a UUIDv4. The id is stored under [`REQUEST_ID`] and echoed on
/// the response.
pub fn request_id() -> impl Fn(Endpoint) -> Endpoint + Send + Sync + 'static {
    |next: Endpoint| {
        endpoint(move |cx, req| {
            let next = Arc::clone(&next);
            async move {
                let id = req
                    .header(&X_REQUEST_ID)
                    .filter(|id| !id.is_empty() && id.len() <= MAX_LEN)
                    .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);

                if let Ok(value) = HeaderValue::from_str(&id) {
                    req.set_response_header(X_REQUEST_ID, value);
                }
                req.set(&REQUEST_ID, id);
                next(cx, req).await
            }
        })
    }
}
