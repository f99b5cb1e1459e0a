use std::time::Duration;

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::api::dto::ErrorResponse;

/// Answers `408` when the handler has not produced a response within `limit`.
pub async fn timeout_middleware(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(limit_secs = limit.as_secs(), "Request timed out");
            (
                StatusCode::REQUEST_TIMEOUT,
                Json(ErrorResponse::new("REQUEST_TIMEOUT", "Request timed out")),
            )
                .into_response()
        }
    }
}
