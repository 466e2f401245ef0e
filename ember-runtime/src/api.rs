//! Internal HTTP API.
//!
//! - `POST /wake`: sleeper/dashboard -> provisioner
//! - `POST /heartbeat`: in-VM agent -> lifecycle store (bearer = shared secret)
//! - `POST /jobs/{billing|idle|stuck}`: cron triggers (operator secret header)
//! - `GET /servers`, `GET /wake/{id}/progress`: operator visibility
//!
//! Every externally observable failure resolves to an HTTP error status;
//! nothing here panics across a request boundary.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::artifacts::Software;
use crate::auth::{bearer_token, require_operator};
use crate::billing::billing_tick;
use crate::error::EmberError;
use crate::heartbeat::{self, HeartbeatOutcome, HeartbeatReport};
use crate::progress;
use crate::provision::{self, TeardownTrigger};
use crate::reaper::{idle_tick, stuck_tick};
use crate::runtime::Runtime;
use crate::server::{ServerRecord, ServerStatus};

type AppState = Arc<Runtime>;

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError { error: msg.into() }))
}

fn error_response(err: EmberError) -> (StatusCode, Json<ApiError>) {
    let status = match &err {
        EmberError::Auth(_) => StatusCode::UNAUTHORIZED,
        EmberError::NotFound(_) => StatusCode::NOT_FOUND,
        EmberError::Validation(_) => StatusCode::BAD_REQUEST,
        EmberError::State(_) => StatusCode::CONFLICT,
        EmberError::Compute(_)
        | EmberError::Dns(_)
        | EmberError::ObjectStorage(_)
        | EmberError::Artifact(_) => StatusCode::BAD_GATEWAY,
        EmberError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.to_string())
}

// ---------------------------------------------------------------------------
// Wake
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WakeRequest {
    pub server_id: String,
    pub software: String,
    pub version: String,
}

async fn wake_server(
    State(rt): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<WakeRequest>,
) -> impl IntoResponse {
    if let Err(err) = require_operator(&headers, &rt.config) {
        return error_response(err).into_response();
    }
    let software: Software = match req.software.parse() {
        Ok(s) => s,
        Err(err) => return error_response(err).into_response(),
    };

    // Pre-check so a duplicate call gets a 409 instead of a doomed attempt;
    // the provisioner's CAS is still the real guard.
    match rt.servers.get(&req.server_id) {
        Ok(Some(record)) if record.status != ServerStatus::Stopped => {
            return error_response(EmberError::State("already starting".into())).into_response();
        }
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(EmberError::NotFound(format!("no server {}", req.server_id)))
                .into_response();
        }
        Err(err) => return error_response(err).into_response(),
    }

    let server_id = req.server_id.clone();
    let version = req.version.clone();
    tokio::spawn(async move {
        if let Err(err) = provision::wake(&rt, &server_id, software, &version, "api").await {
            error!("wake: server {server_id} failed: {err}");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "waking", "server_id": req.server_id })),
    )
        .into_response()
}

async fn wake_progress(
    State(rt): State<AppState>,
    headers: HeaderMap,
    Path(server_id): Path<String>,
) -> impl IntoResponse {
    if let Err(err) = require_operator(&headers, &rt.config) {
        return error_response(err).into_response();
    }
    match progress::get(&server_id) {
        Some(status) => (StatusCode::OK, Json(serde_json::json!(status))).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "no wake in progress").into_response(),
    }
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn ingest_heartbeat(
    State(rt): State<AppState>,
    headers: HeaderMap,
    Json(report): Json<HeartbeatReport>,
) -> impl IntoResponse {
    let bearer = match bearer_token(&headers) {
        Ok(token) => token,
        Err(err) => return error_response(err).into_response(),
    };

    match heartbeat::ingest(&rt, &bearer, &report) {
        Ok(HeartbeatOutcome::CrashDetected) => {
            let server_id = report.server_id.clone();
            tokio::spawn(async move {
                if let Err(err) =
                    provision::force_teardown(&rt, &server_id, TeardownTrigger::Crash).await
                {
                    error!("crash reset: server {server_id} failed: {err}");
                }
            });
            (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
        }
        Ok(HeartbeatOutcome::Accepted) => {
            (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
        }
        Err(err) => error_response(err).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Cron-trigger endpoints
// ---------------------------------------------------------------------------

async fn run_billing(State(rt): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = require_operator(&headers, &rt.config) {
        return error_response(err).into_response();
    }
    billing_tick(&rt).await;
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
}

async fn run_idle(State(rt): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = require_operator(&headers, &rt.config) {
        return error_response(err).into_response();
    }
    idle_tick(&rt).await;
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
}

async fn run_stuck(State(rt): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = require_operator(&headers, &rt.config) {
        return error_response(err).into_response();
    }
    stuck_tick(&rt).await;
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
}

// ---------------------------------------------------------------------------
// Server summaries
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ServerSummary {
    id: String,
    subdomain: String,
    status: String,
    vm_handle: Option<String>,
    ipv4: Option<String>,
    running_since: Option<u64>,
    last_empty_at: Option<u64>,
}

impl From<&ServerRecord> for ServerSummary {
    fn from(r: &ServerRecord) -> Self {
        Self {
            id: r.id.clone(),
            subdomain: r.subdomain.clone(),
            status: r.status.to_string(),
            vm_handle: r.vm_handle.clone(),
            ipv4: r.ipv4.clone(),
            running_since: r.running_since,
            last_empty_at: r.last_empty_at,
        }
    }
}

async fn list_servers(State(rt): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = require_operator(&headers, &rt.config) {
        return error_response(err).into_response();
    }
    match rt.servers.values() {
        Ok(records) => {
            let summaries: Vec<ServerSummary> = records.iter().map(ServerSummary::from).collect();
            (
                StatusCode::OK,
                Json(serde_json::json!({ "servers": summaries })),
            )
                .into_response()
        }
        Err(err) => error_response(err).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(rt: AppState) -> Router {
    Router::new()
        .route("/wake", post(wake_server))
        .route("/wake/{server_id}/progress", get(wake_progress))
        .route("/heartbeat", post(ingest_heartbeat))
        .route("/jobs/billing", post(run_billing))
        .route("/jobs/idle", post(run_idle))
        .route("/jobs/stuck", post(run_stuck))
        .route("/servers", get(list_servers))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TimeoutLayer::new(Duration::from_secs(120)))
        .with_state(rt)
}
