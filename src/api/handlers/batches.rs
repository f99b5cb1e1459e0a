//! Content-generation batch handlers.

use axum::{
    Json, Router,
    extract::{Path, State, rejection::PathRejection},
    http::StatusCode,
    routing::{get, post},
};
use uuid::Uuid;

use crate::api::dto::{BatchCreatedResponse, CreateBatchRequest};
use crate::error::AppResult;
use crate::models::{Batch, BatchItem};
use crate::state::AppState;
use crate::utils::ValidatedJson;

pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_batch))
        .route("/{id}", get(get_batch))
        .route("/{id}/items", get(list_items))
}

/// POST /api/batches
///
/// Accepts the batch and returns immediately; items are drained by the
/// batch queue loop.
async fn create_batch(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateBatchRequest>,
) -> AppResult<(StatusCode, Json<BatchCreatedResponse>)> {
    let batch = state
        .services
        .batches()
        .create_batch(req.owner_id, req.items)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(BatchCreatedResponse {
            batch_id: batch.id,
            total_items: batch.total_items,
        }),
    ))
}

/// GET /api/batches/{id}
async fn get_batch(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Batch>> {
    let Path(id) = id?;
    Ok(Json(state.services.batches().get_batch(id).await?))
}

/// GET /api/batches/{id}/items
async fn list_items(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Vec<BatchItem>>> {
    let Path(id) = id?;
    Ok(Json(state.services.batches().list_items(id).await?))
}
