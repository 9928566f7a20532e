// tests/status_api.rs
//
// Status router exercised via tower::ServiceExt::oneshot, no sockets.
mod common;

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _;

use common::{harness, history, registry};
use filing_beacon::api::{self, AppState};
use filing_beacon::beacon::Beacon;
use filing_beacon::config::BeaconPlan;

const BODY_LIMIT: usize = 1024 * 1024;

fn app() -> (Router, Arc<Beacon>) {
    let h = harness();
    h.filings.set("0000320193", history("320193", &[("10-Q", "q-1")]));
    let beacon = Arc::new(Beacon::new(
        h.env.clone(),
        Arc::new(registry(&[("AAPL", "320193")])),
        BeaconPlan::default(),
    ));
    (api::router(AppState::new(beacon.clone())), beacon)
}

async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    (status, String::from_utf8(bytes.to_vec()).expect("utf8"))
}

#[tokio::test]
async fn health_is_ok() {
    let (app, _) = app();
    let (status, body) = call(app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn scan_runs_a_tick_and_status_reflects_it() {
    let (app, _) = app();
    let (status, body) = call(app.clone(), "POST", "/scan").await;
    assert_eq!(status, StatusCode::OK);
    let report: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(report["position"], 0);
    assert_eq!(report["tasks"][0]["task"], "filings");
    assert_eq!(report["tasks"][0]["report"]["kind"], "filings");
    assert_eq!(report["tasks"][0]["report"]["results"][0]["status"], "new");

    let (status, body) = call(app, "GET", "/status").await;
    assert_eq!(status, StatusCode::OK);
    let st: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(st["polls"], 1);
    assert_eq!(st["counter"]["position"], 1);
    assert_eq!(st["lastError"], Json::Null);
    assert_eq!(st["lastErrorReportedAt"], Json::Null);
}

#[tokio::test]
async fn filings_lists_recorded_events_newest_first() {
    let h = harness();
    h.filings.set("0000320193", history("320193", &[("10-Q", "q-1")]));
    let beacon = Arc::new(Beacon::new(
        h.env.clone(),
        Arc::new(registry(&[("AAPL", "320193")])),
        BeaconPlan::default(),
    ));
    let app = api::router(AppState::new(beacon));

    let (status, body) = call(app.clone(), "GET", "/filings").await;
    assert_eq!(status, StatusCode::OK);
    let empty: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(empty["events"], Json::Array(vec![]));

    call(app.clone(), "POST", "/scan").await;
    h.filings.set("0000320193", history("320193", &[("10-K", "k-2"), ("10-Q", "q-1")]));
    call(app.clone(), "POST", "/scan").await;

    let (_, body) = call(app.clone(), "GET", "/filings").await;
    let listed: Json = serde_json::from_str(&body).unwrap();
    let events = listed["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["accession"], "k-2");
    assert_eq!(events[0]["primaryDocument"], "doc.htm");
    assert_eq!(events[1]["accession"], "q-1");

    let (_, body) = call(app, "GET", "/filings?limit=1").await;
    let limited: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(limited["events"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_task_is_404() {
    let (app, _) = app();
    let (status, _) = call(app, "POST", "/scan/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_disabled_without_handle() {
    let (app, _) = app();
    let (status, _) = call(app, "GET", "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
