//! Job queue request handlers.

use axum::{
    Json, Router,
    extract::{Path, State, rejection::PathRejection},
    http::StatusCode,
    routing::{get, post},
};
use uuid::Uuid;

use crate::api::dto::{JobResponse, QueueJobRequest};
use crate::error::AppResult;
use crate::models::QueueStats;
use crate::state::AppState;
use crate::utils::ValidatedJson;

pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(queue_job))
        .route("/stats", get(queue_stats))
        .route("/{id}", get(get_job))
        .route("/{id}/cancel", post(cancel_job))
}

/// POST /api/jobs
async fn queue_job(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<QueueJobRequest>,
) -> AppResult<(StatusCode, Json<JobResponse>)> {
    let job = state.services.jobs.queue_job(req.into()).await?;
    Ok((StatusCode::CREATED, Json(JobResponse::from_job(job)?)))
}

/// GET /api/jobs/stats
async fn queue_stats(State(state): State<AppState>) -> AppResult<Json<QueueStats>> {
    Ok(Json(state.services.jobs.queue_stats().await?))
}

/// GET /api/jobs/{id}
async fn get_job(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<JobResponse>> {
    let Path(id) = id?;
    let job = state.services.jobs.get_job(id).await?;
    Ok(Json(JobResponse::from_job(job)?))
}

/// POST /api/jobs/{id}/cancel
///
/// Only `pending` jobs can be cancelled; anything else answers 422.
async fn cancel_job(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<JobResponse>> {
    let Path(id) = id?;
    let job = state.services.jobs.cancel_job(id).await?;
    Ok(Json(JobResponse::from_job(job)?))
}
