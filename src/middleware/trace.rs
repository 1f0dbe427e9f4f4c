use std::sync::Arc;
use std::time::Instant;

use tracing::{Instrument, info, info_span, warn};

use super::REQUEST_ID;
use crate::endpoint::{Endpoint, endpoint};
use crate::error::Error;

/// Opens an `info` span per request (`method`, `route`, `path`, and the
/// request id when [`request_id`](super::request_id) runs outside it) and
/// logs the latency, plus the status of failures.
pub fn trace() -> impl Fn(Endpoint) -> Endpoint + Send + Sync + 'static {
    |next: Endpoint| {
        endpoint(move |cx, req| {
            let next = Arc::clone(&next);
            let request_id = req.get(&REQUEST_ID);
            let span = info_span!(
                "request",
                method = %req.method(),
                route = req.route(),
                path = req.path(),
                request_id = request_id.as_deref().map(String::as_str),
            );

            async move {
                let started = Instant::now();
                let outcome = next(cx, req).await;
                let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

                match &outcome {
                    Ok(_) => info!(latency_ms, "request completed"),
                    Err(e) => {
                        let status = Error::find(&**e).map_or(500, |e| e.status().as_u16());
                        warn!(status, latency_ms, error = %e, "request failed");
                    }
                }
                outcome
            }
            .instrument(span)
        })
    }
}
