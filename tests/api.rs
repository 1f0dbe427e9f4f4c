//! End-to-end behaviour through the public API: register routes, build a
//! dispatcher, push `http::Request`s through it, inspect the JSON.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderValue, Method, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use jsonrest::{
    CancellationToken, Endpoint, Error, Key, Options, Request, ResponseBody, Router, endpoint,
    handler,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};

type Log = Arc<Mutex<Vec<String>>>;

fn request(method: Method, path: &str, body: &str) -> http::Request<Full<Bytes>> {
    http::Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_owned())))
        .unwrap()
}

fn get(path: &str) -> http::Request<Full<Bytes>> {
    request(Method::GET, path, "")
}

async fn body_text(response: Response<ResponseBody>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response<ResponseBody>) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

fn recorder(log: &Log, name: &'static str) -> impl Fn(Endpoint) -> Endpoint + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |next: Endpoint| {
        let log = Arc::clone(&log);
        endpoint(move |cx, req| {
            let next = Arc::clone(&next);
            let log = Arc::clone(&log);
            async move {
                log.lock().push(format!("{name}-pre"));
                let out = next(cx, req).await;
                log.lock().push(format!("{name}-post"));
                out
            }
        })
    }
}

fn recording_endpoint(log: &Log) -> impl Fn(CancellationToken, Request) -> futures::future::Ready<Result<Value, Error>> + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |_cx, _req| {
        log.lock().push("E".to_owned());
        futures::future::ready(Ok(json!({"ok": true})))
    }
}

#[tokio::test]
async fn hello_world_renders_the_value_verbatim() {
    let app = Router::new();
    app.get("/hello", |_cx, _req| async {
        Ok::<_, Error>(json!({"message": "Hello World"}))
    });

    let response = app.build().dispatch(get("/hello")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json; charset=utf-8");
    assert_eq!(body_text(response).await, "{\n  \"message\": \"Hello World\"\n}\n");
}

#[tokio::test]
async fn invalid_json_is_a_bad_request_with_position() {
    #[derive(Deserialize)]
    struct Greeting {
        #[allow(dead_code)]
        name: String,
    }

    let app = Router::new();
    app.post("/greet", |_cx, req: Request| async move {
        let greeting: Greeting = req.bind()?;
        Ok::<_, Error>(json!({"name": greeting.name}))
    });

    let response = app.build().dispatch(request(Method::POST, "/greet", "{\"name\": ")).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "bad_request");
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.starts_with("malformed or unexpected json: offset "), "{message}");
    assert!(body["error"].get("details").is_none());
}

#[tokio::test]
async fn unknown_path_is_url_not_found() {
    let response = Router::new().build().dispatch(get("/missing")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        json!({"error": {"code": "not_found", "message": "url not found"}})
    );
}

#[tokio::test]
async fn custom_not_found_output_is_returned_unmodified() {
    let options = Options::new().not_found(|req: http::Request<Bytes>| async move {
        let mut response = Response::new(Full::new(Bytes::from(format!("nothing at {}", req.uri().path()))));
        *response.status_mut() = StatusCode::GONE;
        response
    });
    let app = Router::with_options(options);
    app.get("/present", |_cx, _req| async { Ok::<_, Error>(()) });

    let response = app.build().dispatch(get("/absent")).await;

    assert_eq!(response.status(), StatusCode::GONE);
    assert!(response.headers().get("content-type").is_none());
    assert_eq!(body_text(response).await, "nothing at /absent");
}

#[tokio::test]
async fn structured_errors_keep_status_and_code() {
    let app = Router::new();
    app.get("/customers/:id", |_cx, _req| async {
        Err::<(), _>(Error::new(StatusCode::NOT_FOUND, "customer_not_found", "customer not found"))
    });

    let response = app.build().dispatch(get("/customers/7")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        json!({"error": {"code": "customer_not_found", "message": "customer not found"}})
    );
}

#[tokio::test]
async fn plain_errors_are_unknown_errors() {
    let app = Router::new();
    app.get("/db", |_cx, _req| async { Err::<(), _>(anyhow::anyhow!("connection refused")) });

    let response = app.build().dispatch(get("/db")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_text(response).await;
    assert!(!body.contains("connection refused"), "{body}");
    assert_eq!(
        serde_json::from_str::<Value>(&body).unwrap(),
        json!({"error": {"code": "unknown_error", "message": "an unknown error occurred"}})
    );
}

#[tokio::test]
async fn dump_errors_only_toggles_details() {
    fn app(dump: bool) -> Router {
        let app = Router::with_options(Options::new().dump_errors(dump));
        app.get("/wrapped", |_cx, _req| async {
            let cause = std::io::Error::other("disk on fire");
            Err::<(), _>(Error::conflict("cannot save").wrap(cause))
        })
        .get("/plain", |_cx, _req| async { Err::<(), _>(anyhow::anyhow!("raw failure")) });
        app
    }

    let quiet = app(false).build();
    let loud = app(true).build();

    let response = quiet.dispatch(get("/wrapped")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert!(body["error"].get("details").is_none());

    let response = loud.dispatch(get("/wrapped")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "conflict");
    assert_eq!(body["error"]["details"], json!(["disk on fire"]));

    let response = loud.dispatch(get("/plain")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "unknown_error");
    assert_eq!(body["error"]["details"], json!(["raw failure"]));
}

#[tokio::test]
async fn nested_groups_run_outer_middleware_first() {
    let log = Log::default();
    let outer = Router::new();
    outer.use_middleware(recorder(&log, "M1"));
    let inner = outer.group();
    inner.use_middleware(recorder(&log, "M2"));
    inner.get("/e", recording_endpoint(&log));

    let response = outer.build().dispatch(get("/e")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(*log.lock(), ["M1-pre", "M2-pre", "E", "M2-post", "M1-post"]);
}

#[tokio::test]
async fn sibling_groups_are_isolated() {
    let log = Log::default();
    let root = Router::new();
    let a = root.group();
    a.use_middleware(recorder(&log, "A"));
    a.get("/a", recording_endpoint(&log));
    let b = root.group();
    b.use_middleware(recorder(&log, "B"));
    b.get("/b", recording_endpoint(&log));
    let dispatcher = root.build();

    dispatcher.dispatch(get("/b")).await;
    assert_eq!(*log.lock(), ["B-pre", "E", "B-post"]);

    log.lock().clear();
    dispatcher.dispatch(get("/a")).await;
    assert_eq!(*log.lock(), ["A-pre", "E", "A-post"]);
}

#[tokio::test]
async fn parent_middleware_registered_late_still_applies() {
    let log = Log::default();
    let root = Router::new();
    let child = root.group();
    child.get("/late", recording_endpoint(&log));
    root.use_middleware(recorder(&log, "late"));

    root.build().dispatch(get("/late")).await;

    assert_eq!(*log.lock(), ["late-pre", "E", "late-post"]);
}

#[tokio::test]
async fn a_panic_does_not_disturb_a_concurrent_request() {
    let app = Router::new();
    app.get("/boom", |_cx, _req| async {
        tokio::task::yield_now().await;
        if true {
            panic!("endpoint exploded");
        }
        Ok::<_, Error>(())
    })
    .get("/calm", |_cx, _req| async {
        tokio::task::yield_now().await;
        Ok::<_, Error>(json!({"calm": true}))
    });
    let dispatcher = app.build();

    let (boom, calm) = tokio::join!(dispatcher.dispatch(get("/boom")), dispatcher.dispatch(get("/calm")));

    assert_eq!(boom.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(boom).await,
        json!({"error": {"code": "unknown_error", "message": "an unknown error occurred"}})
    );
    assert_eq!(calm.status(), StatusCode::OK);
    assert_eq!(body_json(calm).await, json!({"calm": true}));

    // The dispatcher keeps serving afterwards.
    let again = dispatcher.dispatch(get("/calm")).await;
    assert_eq!(again.status(), StatusCode::OK);
}

#[tokio::test]
async fn panicking_middleware_is_contained() {
    let app = Router::new();
    app.use_middleware(|next: Endpoint| {
        endpoint(move |cx, req| {
            let next = Arc::clone(&next);
            async move {
                if req.header("x-explode").is_some() {
                    panic!("middleware exploded");
                }
                next(cx, req).await
            }
        })
    });
    app.get("/", |_cx, _req| async { Ok::<_, Error>("fine") });
    let dispatcher = app.build();

    let exploding = http::Request::get("/")
        .header("x-explode", "1")
        .body(Full::new(Bytes::new()))
        .unwrap();
    assert_eq!(dispatcher.dispatch(exploding).await.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(dispatcher.dispatch(get("/")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn colon_and_brace_params_resolve_alike() {
    let app = Router::new();
    app.get("/colon/:id", |_cx, req: Request| async move {
        Ok::<_, Error>(json!({"id": req.param("id"), "route": req.route()}))
    })
    .get("/brace/{id}", |_cx, req: Request| async move {
        Ok::<_, Error>(json!({"id": req.param("id"), "route": req.route()}))
    });
    let dispatcher = app.build();

    let colon = body_json(dispatcher.dispatch(get("/colon/42")).await).await;
    let brace = body_json(dispatcher.dispatch(get("/brace/42")).await).await;

    assert_eq!(colon["id"], "42");
    assert_eq!(brace["id"], "42");
    assert_eq!(colon["route"], "/colon/:id");
    assert_eq!(brace["route"], "/brace/{id}");
}

#[tokio::test]
async fn metadata_flows_from_middleware_to_endpoint_and_back() {
    const USER: Key<String> = Key::new("user");
    const SEEN: Key<bool> = Key::new("seen");

    let app = Router::new();
    app.use_middleware(|next: Endpoint| {
        endpoint(move |cx, req| {
            let next = Arc::clone(&next);
            async move {
                req.set(&USER, "alice".to_owned());
                let out = next(cx, req.clone()).await;
                let seen = req.get(&SEEN).is_some_and(|seen| *seen);
                out.map(|value| json!({"inner": value, "seen": seen}))
            }
        })
    });
    app.get("/me", |_cx, req: Request| async move {
        let user = req.get(&USER).ok_or_else(|| Error::unauthorized("anonymous"))?;
        req.set(&SEEN, true);
        Ok::<_, Error>(json!({"user": user.as_str()}))
    });

    let body = body_json(app.build().dispatch(get("/me")).await).await;

    assert_eq!(body, json!({"inner": {"user": "alice"}, "seen": true}));
}

#[tokio::test]
async fn basic_auth_guard() {
    let app = Router::new();
    app.get("/private", |_cx, req: Request| async move {
        match req.basic_auth() {
            Some((user, pass)) if user == "admin" && pass == "secret" => Ok(json!({"user": user})),
            _ => Err(Error::unauthorized("credentials required")),
        }
    });
    let dispatcher = app.build();

    // admin:secret
    let authorized = http::Request::get("/private")
        .header("authorization", "Basic YWRtaW46c2VjcmV0")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = dispatcher.dispatch(authorized).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"user": "admin"}));

    let response = dispatcher.dispatch(get("/private")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn response_headers_survive_success_and_error() {
    let app = Router::new();
    app.use_middleware(|next: Endpoint| {
        endpoint(move |cx, req| {
            let next = Arc::clone(&next);
            async move {
                req.set_response_header("x-served-by", HeaderValue::from_static("jsonrest"));
                next(cx, req).await
            }
        })
    });
    app.post("/items", |_cx, req: Request| async move {
        req.set_response_status(StatusCode::CREATED);
        Ok::<_, Error>(json!({"id": 1}))
    })
    .get("/forbidden", |_cx, _req| async { Err::<(), _>(Error::forbidden("no")) });
    let dispatcher = app.build();

    let created = dispatcher.dispatch(request(Method::POST, "/items", "{}")).await;
    assert_eq!(created.status(), StatusCode::CREATED);
    assert_eq!(created.headers()["x-served-by"], "jsonrest");

    let forbidden = dispatcher.dispatch(get("/forbidden")).await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    assert_eq!(forbidden.headers()["x-served-by"], "jsonrest");
    assert_eq!(forbidden.headers()["content-type"], "application/json; charset=utf-8");
}

#[tokio::test]
async fn bulk_routes_register_every_entry() {
    async fn ping(_cx: CancellationToken, req: Request) -> Result<Value, Error> {
        Ok(json!({"method": req.method().as_str()}))
    }

    let app = Router::new();
    app.routes([
        ("GET /ping", handler(ping)),
        ("POST  /ping", handler(ping)),
        ("DELETE\t/things/:id", handler(ping)),
    ]);
    let dispatcher = app.build();

    let response = dispatcher.dispatch(get("/ping")).await;
    assert_eq!(body_json(response).await, json!({"method": "GET"}));
    let response = dispatcher.dispatch(request(Method::POST, "/ping", "")).await;
    assert_eq!(body_json(response).await, json!({"method": "POST"}));
    let response = dispatcher.dispatch(request(Method::DELETE, "/things/9", "")).await;
    assert_eq!(body_json(response).await, json!({"method": "DELETE"}));
}

#[test]
#[should_panic(expected = "invalid route map entry")]
fn bulk_routes_reject_malformed_keys() {
    async fn ping(_cx: CancellationToken, _req: Request) -> Result<(), Error> {
        Ok(())
    }
    Router::new().routes([("/no-method", handler(ping))]);
}

#[tokio::test]
async fn form_bodies_bind_too() {
    #[derive(Deserialize)]
    struct Login {
        user: String,
        remember: bool,
    }

    let app = Router::new();
    app.post("/login", |_cx, req: Request| async move {
        let login: Login = req.bind()?;
        Ok::<_, Error>(json!({"user": login.user, "remember": login.remember}))
    });

    let req = http::Request::post("/login")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Full::new(Bytes::from_static(b"user=bob&remember=true")))
        .unwrap();
    let body = body_json(app.build().dispatch(req).await).await;

    assert_eq!(body, json!({"user": "bob", "remember": true}));
}
