//! Minimal jsonrest example: nested groups, middleware, JSON errors, and
//! health checks.
//!
//! Run with:
//!   RUST_LOG=info JSONREST_DUMP_ERRORS=1 cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/hello
//!   curl http://localhost:3000/api/customers/42
//!   curl -X POST http://localhost:3000/api/customers \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -u admin:secret http://localhost:3000/api/admin/stats
//!   curl http://localhost:3000/healthz

use std::sync::Arc;

use http::StatusCode;
use jsonrest::{
    CancellationToken, Endpoint, Error, Options, Request, Router, Server, endpoint, health,
    middleware,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Deserialize)]
struct CreateCustomer {
    name: String,
}

#[derive(Serialize)]
struct Customer {
    id: u64,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), jsonrest::ServeError> {
    tracing_subscriber::fmt::init();

    let app = Router::with_options(Options::from_env());
    app.use_middleware(middleware::request_id())
        .use_middleware(middleware::trace());

    app.get("/hello", hello)
        .get("/healthz", health::liveness)
        .get("/readyz", health::readiness);

    let api = app.group();
    api.get("/api/customers/:id", get_customer)
        .post("/api/customers", create_customer);

    let admin = api.group();
    admin.use_middleware(require_admin);
    admin.get("/api/admin/stats", stats);

    Server::bind("0.0.0.0:3000").serve(app).await
}

async fn hello(_cx: CancellationToken, _req: Request) -> Result<Value, Error> {
    Ok(json!({"hello": "world"}))
}

// GET /api/customers/:id
async fn get_customer(_cx: CancellationToken, req: Request) -> Result<Customer, Error> {
    let id = req.param("id").unwrap_or_default();
    match id.parse::<u64>() {
        Ok(1) => Ok(Customer { id: 1, name: "alice".to_owned() }),
        Ok(_) => Err(Error::new(StatusCode::NOT_FOUND, "customer_not_found", "customer not found")),
        Err(e) => Err(Error::bad_request("customer id must be numeric").wrap(e)),
    }
}

// POST /api/customers -> 201
async fn create_customer(_cx: CancellationToken, req: Request) -> Result<Customer, Error> {
    let input: CreateCustomer = req.bind()?;
    if input.name.trim().is_empty() {
        return Err(Error::unprocessable_entity("name must not be empty"));
    }
    req.set_response_status(StatusCode::CREATED);
    Ok(Customer { id: 99, name: input.name })
}

async fn stats(_cx: CancellationToken, _req: Request) -> Result<Value, Error> {
    Ok(json!({"customers": 1}))
}

fn require_admin(next: Endpoint) -> Endpoint {
    endpoint(move |cx, req| {
        let next = Arc::clone(&next);
        async move {
            match req.basic_auth() {
                Some((user, pass)) if user == "admin" && pass == "secret" => next(cx, req).await,
                _ => Err(Error::unauthorized("admin credentials required").into()),
            }
        }
    })
}
