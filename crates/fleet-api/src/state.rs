use std::sync::Arc;

use fleet_engine::ReconcileEngine;
use fleet_store::StateStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    pub engine: Arc<ReconcileEngine>,
    pub auth_token: Arc<String>,
}
