use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use fleet_engine::ReconcileEngine;
use fleet_store::StateStore;
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer_token;
use crate::handlers;
use crate::state::AppState;

pub fn build_app(store: Arc<dyn StateStore>, engine: Arc<ReconcileEngine>, auth_token: Arc<String>) -> Router {
    let state = AppState { store, engine, auth_token };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/state", get(handlers::get_state))
        .route("/v1/state/target", get(handlers::get_state_target))
        .route("/v1/state/history", get(handlers::get_state_history))
        .route("/v1/reconcile", post(handlers::post_reconcile))
        .route("/v1/metrics", get(handlers::get_metrics))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
