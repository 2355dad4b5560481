// src/api.rs
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::workers::registry::{Orchestrator, UnknownSource, GROUP_ALL};
use crate::workers::result::{format_seconds, TotalStats};

pub const ENV_ADMIN_TOKEN: &str = "INGEST_ADMIN_TOKEN";
pub const ENV_CRON_SECRET: &str = "CRON_SECRET";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// When set, admin routes require `Authorization: Bearer <token>`.
    pub admin_token: Option<String>,
    /// Cron route is closed while this is unset.
    pub cron_secret: Option<String>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            admin_token: None,
            cron_secret: None,
        }
    }

    /// Tokens from `INGEST_ADMIN_TOKEN` and `CRON_SECRET`; blank counts as unset.
    pub fn from_env(orchestrator: Arc<Orchestrator>) -> Self {
        let var = |k: &str| {
            std::env::var(k)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            orchestrator,
            admin_token: var(ENV_ADMIN_TOKEN),
            cron_secret: var(ENV_CRON_SECRET),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/admin/ingest", get(admin_status).post(admin_ingest))
        .route("/cron/ingest", get(cron_ingest))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn bearer_matches(headers: &HeaderMap, secret: &str) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|t| t == secret)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response()
}

fn admin_allowed(state: &AppState, headers: &HeaderMap) -> bool {
    match &state.admin_token {
        Some(token) => bearer_matches(headers, token),
        None => true,
    }
}

fn invalid_source(e: UnknownSource) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": format!("invalid source \"{}\"", e.requested),
            "validSources": e.valid,
        })),
    )
        .into_response()
}

async fn admin_status(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !admin_allowed(&state, &headers) {
        return unauthorized();
    }
    let sources = state.orchestrator.available_sources();
    let ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
    Json(json!({
        "success": true,
        "availableSources": sources,
        "usage": {
            "endpoint": "POST /admin/ingest",
            "body": { "source": ids.join(" | ") },
            "example": { "source": "core-nacional" },
        },
    }))
    .into_response()
}

#[derive(Debug, Default, Deserialize)]
struct IngestReq {
    #[serde(default)]
    source: Option<String>,
}

async fn admin_ingest(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if !admin_allowed(&state, &headers) {
        return unauthorized();
    }
    // missing or malformed body is treated as an empty request
    let req: IngestReq = serde_json::from_slice(&body).unwrap_or_default();
    let source = req.source.unwrap_or_default();
    if source.is_empty() {
        return invalid_source(UnknownSource {
            requested: source,
            valid: state
                .orchestrator
                .available_sources()
                .into_iter()
                .map(|d| d.id)
                .collect(),
        });
    }

    let started = Instant::now();
    let results = match state.orchestrator.run(&source).await {
        Ok(r) => r,
        Err(e) => return invalid_source(e),
    };
    let duration = format!("{}s", format_seconds(started.elapsed().as_secs_f64()));
    let sources: Vec<&str> = results.iter().map(|r| r.source.as_str()).collect();

    tracing::info!(target: "ingest", requested = %source, duration = %duration, "admin ingest finished");
    Json(json!({
        "success": true,
        "requestedSource": source,
        "duration": duration,
        "sources": sources,
        "totalStats": TotalStats::sum(&results),
        "results": results,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct CronQuery {
    source: Option<String>,
}

async fn cron_ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<CronQuery>,
) -> Response {
    let Some(secret) = state.cron_secret.as_deref() else {
        return unauthorized();
    };
    if !bearer_matches(&headers, secret) {
        return unauthorized();
    }
    let source = q
        .source
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| GROUP_ALL.to_string());

    let results = match state.orchestrator.run(&source).await {
        Ok(r) => r,
        Err(e) => return invalid_source(e),
    };
    let totals = TotalStats::sum(&results);
    Json(json!({
        "success": true,
        "stats": {
            "found": totals.found,
            "new": totals.new,
            "errors": totals.errors,
        },
    }))
    .into_response()
}
