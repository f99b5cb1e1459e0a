//! Router assembly for the admin API.

use std::time::Duration;

use axum::{Router, middleware};

use crate::api::handlers;
use crate::api::middleware::{logging_middleware, request_id_middleware, timeout_middleware};
use crate::state::AppState;

/// Every route lives under `/api`. Layers run last-added first, so the
/// request ID is in place before the logging span opens and timed-out
/// requests are still logged.
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    let api_routes = Router::new()
        .merge(handlers::health::health_routes())
        .nest("/engine", handlers::engine::engine_routes())
        .nest("/jobs", handlers::jobs::job_routes())
        .nest("/entities", handlers::entities::entity_routes())
        .nest("/batches", handlers::batches::batch_routes());

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            request_timeout,
            timeout_middleware,
        ))
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
