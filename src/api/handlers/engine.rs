use axum::{Json, Router, extract::State, routing::get};

use crate::services::EngineStatus;
use crate::state::AppState;

pub fn engine_routes() -> Router<AppState> {
    Router::new().route("/status", get(engine_status))
}

/// GET /api/engine/status
async fn engine_status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.services.engine.status().await)
}
