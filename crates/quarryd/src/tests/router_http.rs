//! HTTP-level tests of the composed router.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use quarry_config::RegisterMode;
use rstest::rstest;
use serde_json::Value;
use tower::ServiceExt;

use crate::cfg::Cfg;
use crate::rest::DefaultRestMount;
use crate::router::{REQUEST_COUNTER, UI_ENTRY, compose_router};

use super::support::{FIXTURE_UUID, RestFixture};

fn router_for(fixture: &RestFixture) -> Router {
    compose_router(&fixture.context, &DefaultRestMount)
        .expect("compose router")
        .router
}

async fn send(router: &Router, method: Method, uri: &str) -> Response {
    send_request(
        router,
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request"),
    )
    .await
}

async fn send_request(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.expect("response")
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).expect("json body")
}

fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
}

#[rstest]
#[case("/", UI_ENTRY)]
#[case("/index.html", UI_ENTRY)]
#[case("/indexes", UI_ENTRY)]
#[case("/nodes/", UI_ENTRY)]
#[case("/monitor/cluster/a", UI_ENTRY)]
#[case("/static/partials/index/list.html", "/staticx/partials/index/list.html")]
#[tokio::test]
async fn ui_paths_redirect(#[case] uri: &str, #[case] target: &str) {
    let fixture = RestFixture::new();
    let router = router_for(&fixture);
    let response = send(&router, Method::GET, uri).await;
    assert_eq!(response.status(), StatusCode::FOUND, "{uri}");
    assert_eq!(location(&response), Some(target));
}

#[tokio::test]
async fn staticx_serves_primary_assets() {
    let fixture = RestFixture::new();
    let router = router_for(&fixture);
    let response = send(&router, Method::GET, UI_ENTRY).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
        Some(b"text/html; charset=utf-8".as_slice())
    );
    assert!(body_text(response).await.contains("data-ui=\"staticx\""));

    let directory = send(&router, Method::GET, "/staticx/").await;
    assert_eq!(directory.status(), StatusCode::OK);
}

#[tokio::test]
async fn static_chain_prefers_primary_then_falls_back() {
    let fixture = RestFixture::new();
    let router = router_for(&fixture);

    let index = send(&router, Method::GET, "/static/index.html").await;
    assert_eq!(index.status(), StatusCode::OK);
    assert!(body_text(index).await.contains("data-ui=\"staticx\""));

    let script = send(&router, Method::GET, "/static/js/quarry.js").await;
    assert_eq!(script.status(), StatusCode::OK);
    assert!(
        script
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == "application/javascript")
    );

    let missing = send(&router, Method::GET, "/static/no-such-file.txt").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn static_dir_overrides_embedded_assets_and_honours_etag() {
    let fixture = RestFixture::new();
    let static_dir = fixture.scratch().join("static");
    std::fs::create_dir(&static_dir).expect("static dir");
    std::fs::write(static_dir.join("index.html"), "<p>from disk</p>").expect("write index");
    let fixture = fixture.with_static_dir(static_dir).with_etag("v1");
    let router = router_for(&fixture);

    let response = send(&router, Method::GET, "/static/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ETAG).map(|v| v.as_bytes()),
        Some(b"v1".as_slice())
    );
    assert_eq!(body_text(response).await, "<p>from disk</p>");

    let cached = send_request(
        &router,
        Request::builder()
            .uri("/static/index.html")
            .header(header::IF_NONE_MATCH, "v1")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(cached.status(), StatusCode::NOT_MODIFIED);

    let embedded_only = send(&router, Method::GET, "/static/js/quarry.js").await;
    assert_eq!(embedded_only.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn version_reports_binary_and_data_versions() {
    let fixture = RestFixture::new();
    let router = router_for(&fixture);
    let body = body_json(send(&router, Method::GET, "/api/version").await).await;
    assert_eq!(body["version"], "0.0.0-test");
    assert_eq!(body["dataVersion"], quarry_config::DATA_VERSION);
}

#[tokio::test]
async fn manager_kick_requires_a_running_registrar() {
    let fixture = RestFixture::new();
    let router = router_for(&fixture);
    let response = send(&router, Method::POST, "/api/managerKick").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"], "registrar is not running");

    let running = RestFixture::new().started(RegisterMode::Wanted);
    let router = router_for(&running);
    let response = send(&router, Method::POST, "/api/managerKick").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn manager_kick_rejects_get() {
    let fixture = RestFixture::new();
    let router = router_for(&fixture);
    let response = send(&router, Method::GET, "/api/managerKick").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn nsstatus_describes_a_local_only_node() {
    let fixture = RestFixture::default().started(RegisterMode::Wanted);
    let router = router_for(&fixture);
    let body = body_json(send(&router, Method::GET, "/api/nsstatus").await).await;
    assert_eq!(body["uuid"], FIXTURE_UUID);
    assert_eq!(body["localOnly"], true);
    assert_eq!(body["server"], ".");
    assert_eq!(body["registerMode"], "wanted");
    assert!(body["nodeDefs"]["nodeDefs-known"].get(FIXTURE_UUID).is_some());
}

#[tokio::test]
async fn cfg_lists_store_entries_with_cas() {
    let fixture = RestFixture::new();
    fixture
        .cfg
        .set("greeting", b"{\"hello\":\"world\"}", 0)
        .expect("set json");
    fixture.cfg.set("plain", b"not json", 0).expect("set text");
    let router = router_for(&fixture);
    let body = body_json(send(&router, Method::GET, "/api/cfg").await).await;
    assert_eq!(body["connect"], "mem");
    assert_eq!(body["entries"]["greeting"]["value"]["hello"], "world");
    assert_eq!(body["entries"]["plain"]["value"], "not json");
    assert!(body["entries"]["plain"]["cas"].as_u64().is_some_and(|cas| cas > 0));
}

#[tokio::test]
async fn diag_combines_snapshots_and_log() {
    let fixture = RestFixture::new();
    let router = router_for(&fixture);
    let body = body_json(send(&router, Method::GET, "/api/diag").await).await;
    assert_eq!(body["diagnostics"]["threads"], "tid=1 name=main\n");
    assert_eq!(body["registrarState"], "unstarted");
    assert!(body["log"].is_array());
    assert_eq!(body["stats"][REQUEST_COUNTER], 1);
}

#[tokio::test]
async fn log_reports_ring_capacity() {
    let fixture = RestFixture::new();
    let router = router_for(&fixture);
    let body = body_json(send(&router, Method::GET, "/api/log").await).await;
    assert_eq!(body["capacity"], 16);
    assert_eq!(fixture.ring.capacity(), 16);
}

#[tokio::test]
async fn every_routed_request_is_counted() {
    let fixture = RestFixture::new();
    let router = router_for(&fixture);
    send(&router, Method::GET, "/api/version").await;
    send(&router, Method::GET, "/api/stats").await;
    assert_eq!(fixture.stats.counter(REQUEST_COUNTER).get(), 2);
}
