use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::beacon::{Beacon, BeaconStatus, TickOutcome};
use crate::dedup::FILING_EVENTS_CAP;

pub const FILING_EVENTS_DEFAULT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub beacon: Arc<Beacon>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(beacon: Arc<Beacon>) -> Self {
        Self {
            beacon,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .route("/filings", get(filings))
        .route("/scan", post(scan))
        .route("/scan/{task}", post(scan_task))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<BeaconStatus> {
    Json(state.beacon.status().await)
}

#[derive(Debug, Deserialize)]
struct FilingsQuery {
    limit: Option<usize>,
}

/// Newest first.
async fn filings(State(state): State<AppState>, Query(q): Query<FilingsQuery>) -> Response {
    let limit = q.limit.unwrap_or(FILING_EVENTS_DEFAULT).min(FILING_EVENTS_CAP);
    let events = state.beacon.filing_events(limit).await;
    Json(json!({ "events": events })).into_response()
}

async fn scan(State(state): State<AppState>) -> Response {
    outcome_response(state.beacon.tick().await)
}

async fn scan_task(State(state): State<AppState>, Path(task): Path<String>) -> Response {
    if state.beacon.plan().task(&task).is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown scan task `{task}`") })),
        )
            .into_response();
    }
    outcome_response(state.beacon.run_now(&task).await)
}

fn outcome_response(outcome: TickOutcome) -> Response {
    match outcome {
        TickOutcome::Completed(report) => (StatusCode::OK, Json(report)).into_response(),
        TickOutcome::Skipped => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "a tick is already running" })),
        )
            .into_response(),
        TickOutcome::Failed(msg) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": msg })),
        )
            .into_response(),
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(h) => h.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
