use std::io;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::response::Response;
use axum::routing::{get, put};
use reqwest::StatusCode;
use serde_json::json;

use opsgate_api::routes::{self, RouteContext, RouteModule};
use opsgate_cluster::{SharedState, WorkerId};
use opsgate_core::Config;
use opsgate_sessions::SessionStore;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(&[]).await
    }

    /// Build the same app as prod (memory session store), optionally with
    /// extra route modules, and bind to an ephemeral port.
    async fn spawn_with(extra: &[RouteModule]) -> Self {
        let cfg = Config::from_lookup(|_| None).expect("default config");
        let store = SessionStore::connect(&cfg).await.expect("memory store");

        let mut modules: Vec<RouteModule> = routes::MODULES.to_vec();
        modules.extend_from_slice(extra);

        let app = opsgate_api::app::build_app(
            &cfg,
            Arc::new(store),
            SharedState::new(),
            WorkerId::new(1),
            &modules,
        )
        .await
        .expect("build app");
        let app = opsgate_api::server::with_cors(app);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn fault_routes() -> RouteModule {
    RouteModule {
        name: "faults",
        register: register_faults,
    }
}

fn register_faults(router: Router, _ctx: &RouteContext) -> Router {
    router
        .route("/boom", get(boom))
        .route("/fail", get(fail))
        .route("/drip", get(drip))
        .route("/thing", put(thing))
}

async fn boom() -> &'static str {
    panic!("wires crossed");
}

async fn fail() -> opsgate_api::errors::ApiError {
    opsgate_api::errors::ApiError::Internal("db exploded".into())
}

// Streams one good chunk, then hits an error after the status line and the
// first bytes are already on the wire.
async fn drip() -> Response {
    let chunks: Vec<Result<&'static str, io::Error>> =
        vec![Ok("partial,"), Err(io::Error::other("pipe burst"))];
    Response::new(Body::from_stream(futures::stream::iter(chunks)))
}

async fn thing() -> &'static str {
    "put-ok"
}

#[tokio::test]
async fn clean_requests_succeed_with_cors_headers() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/health", server.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let headers = res.headers().clone();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(
        headers["access-control-allow-methods"],
        "POST, GET, OPTIONS, DELETE, PUT"
    );
    assert!(
        headers["access-control-allow-headers"]
            .to_str()
            .unwrap()
            .contains("X-Api-Call")
    );

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn correlation_headers_are_accepted_and_optional() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // With the full header set.
    let res = client
        .get(format!("{}/whoami", server.base_url))
        .header("scenario_id", "s-1")
        .header("run_id", "r-1")
        .header("thread_id", "t-1")
        .header("user_id", "u-1")
        .header("bop_id", "b-1")
        .header("operation_id", "o-1")
        .header("txn_id", "x-1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["authenticated"], false);
    assert_eq!(body["node_id"], "CLUSTER_NODE_1");

    // And with none of them.
    let res = client
        .get(format!("{}/whoami", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn panics_become_the_json_fault_envelope() {
    let server = TestServer::spawn_with(&[fault_routes()]).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/boom", server.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], true);
    assert_eq!(body["errorMsg"], "Error - wires crossed");
}

#[tokio::test]
async fn handler_errors_use_the_same_envelope() {
    let server = TestServer::spawn_with(&[fault_routes()]).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/fail", server.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], true);
    assert_eq!(body["errorMsg"], "Error - db exploded");
}

#[tokio::test]
async fn mid_stream_faults_append_instead_of_replacing() {
    let server = TestServer::spawn_with(&[fault_routes()]).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/drip", server.base_url))
        .send()
        .await
        .unwrap();

    // Headers were already sent when the fault hit, so the status stays 200
    // and the error is appended to the partial body.
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.text().await.unwrap();
    assert!(body.starts_with("partial,"), "body was {body:?}");
    assert!(body.contains("Error - "), "body was {body:?}");
    assert!(body.contains("pipe burst"), "body was {body:?}");
}

#[tokio::test]
async fn login_establishes_a_session_identity() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .unwrap();

    let res = client
        .post(format!("{}/login", server.base_url))
        .json(&json!({ "name": "amara", "roles": ["admin"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = client
        .get(format!("{}/whoami", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["name"], "amara");

    // And logout drops it again.
    client
        .post(format!("{}/logout", server.base_url))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = client
        .get(format!("{}/whoami", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["authenticated"], false);
}

#[tokio::test]
async fn guarded_routes_admit_the_required_role_only() {
    let server = TestServer::spawn().await;

    let admin = reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .unwrap();
    admin
        .post(format!("{}/login", server.base_url))
        .json(&json!({ "name": "root", "roles": ["admin"] }))
        .send()
        .await
        .unwrap();

    let res = admin
        .get(format!("{}/admin/status", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // A logged-in non-admin is still denied.
    let viewer = reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .unwrap();
    viewer
        .post(format!("{}/login", server.base_url))
        .json(&json!({ "name": "vi", "roles": ["viewer"] }))
        .send()
        .await
        .unwrap();
    let res = viewer
        .get(format!("{}/admin/status", server.base_url))
        .header("accept", "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(res.text().await.unwrap(), "You don't have permission to this action.");
}

#[tokio::test]
async fn any_signed_in_user_may_use_the_platform() {
    let server = TestServer::spawn().await;

    // Anonymous clients are turned away.
    let anon = reqwest::Client::new();
    let res = anon
        .get(format!("{}/account/profile", server.base_url))
        .header("accept", "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Any authenticated identity passes, no admin role required.
    let viewer = reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .unwrap();
    viewer
        .post(format!("{}/login", server.base_url))
        .json(&json!({ "name": "vi", "roles": ["viewer"] }))
        .send()
        .await
        .unwrap();

    let res = viewer
        .get(format!("{}/account/profile", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["name"], "vi");
    assert_eq!(body["roles"][0], "viewer");
}

#[tokio::test]
async fn appended_stream_faults_survive_content_encoding() {
    let server = TestServer::spawn_with(&[fault_routes()]).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/drip", server.base_url))
        .header("accept-encoding", "gzip")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-encoding"], "gzip");

    // The whole body, appended error chunk included, went through the
    // encoder: gzip magic up front, no raw plaintext trailing the stream.
    let body = res.bytes().await.unwrap();
    assert!(body.starts_with(&[0x1f, 0x8b]), "body was {body:?}");
    assert!(
        !body.windows(10).any(|window| window == b"pipe burst"),
        "plaintext leaked into the encoded stream"
    );
}

#[tokio::test]
async fn denials_negotiate_html_for_browsers() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/admin/status", server.base_url))
        .header("accept", "text/html")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body = res.text().await.unwrap();
    assert!(body.contains("<html"), "body was {body:?}");
    assert!(body.contains("manage-platform"), "body was {body:?}");
}

#[tokio::test]
async fn post_with_method_override_reaches_put_routes() {
    let server = TestServer::spawn_with(&[fault_routes()]).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/thing", server.base_url))
        .header("x-http-method-override", "PUT")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "put-ok");

    // Without the override the POST has nowhere to go.
    let res = client
        .post(format!("{}/thing", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}
