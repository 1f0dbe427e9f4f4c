//! Built-in Kubernetes health-check endpoints.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Register them on your router:
//!
//! ```rust
//! use jsonrest::{Router, health};
//!
//! let app = Router::new();
//! app.get("/healthz", health::liveness)
//!    .get("/readyz", health::readiness);
//! ```
//!
//! Replace `readiness` with your own endpoint to gate on dependencies; return
//! an error with status `503` while they are unavailable.

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::{Error, Request};

/// Always `200 {"status": "ok"}`. If the process can answer at all, it is alive.
pub async fn liveness(_cx: CancellationToken, _req: Request) -> Result<Value, Error> {
    Ok(json!({"status": "ok"}))
}

/// `200 {"status": "ready"}`.
pub async fn readiness(_cx: CancellationToken, _req: Request) -> Result<Value, Error> {
    Ok(json!({"status": "ready"}))
}
