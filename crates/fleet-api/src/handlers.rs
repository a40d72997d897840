use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use fleet_config::SystemMetrics;
use fleet_domain::StateSnapshot;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health(State(state): State<AppState>) -> StatusCode {
    match state.engine.health().await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

pub async fn get_state(State(state): State<AppState>) -> Result<Json<StateSnapshot>, ApiError> {
    let current = state.engine.get_current().await?;
    Ok(Json(current))
}

pub async fn get_state_target(State(state): State<AppState>) -> Result<Json<StateSnapshot>, ApiError> {
    let target = state.engine.get_target().await?;
    Ok(Json(target))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

pub async fn get_state_history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let records = state.store.history(q.limit.unwrap_or(50)).await?;
    Ok(Json(json!(records)))
}

// ── Reconcile ─────────────────────────────────────────────────────────────────

pub async fn post_reconcile(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let outcome = state.engine.reconcile().await?;
    Ok(Json(json!(outcome)))
}

// ── Metrics ───────────────────────────────────────────────────────────────────

pub async fn get_metrics() -> Json<SystemMetrics> {
    Json(SystemMetrics::collect())
}
