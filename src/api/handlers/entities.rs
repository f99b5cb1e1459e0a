//! Per-entity scheduling trigger.

use axum::{
    Json, Router,
    extract::{Path, State, rejection::PathRejection},
    routing::post,
};
use uuid::Uuid;

use crate::api::dto::JobResponse;
use crate::error::AppResult;
use crate::state::AppState;

pub fn entity_routes() -> Router<AppState> {
    Router::new().route("/{id}/schedule", post(schedule_entity))
}

/// POST /api/entities/{id}/schedule
///
/// Runs the scheduling pass for one entity right away and returns the jobs it
/// enqueued, which is empty when every type is active or not yet due.
async fn schedule_entity(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Vec<JobResponse>>> {
    let Path(id) = id?;
    let jobs = state.services.engine.schedule_entity(id).await?;
    let responses = jobs
        .into_iter()
        .map(JobResponse::from_job)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Json(responses))
}
