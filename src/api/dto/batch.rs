//! Batch DTOs.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

/// Request body for `POST /api/batches`. The item count upper bound is
/// configuration-dependent and checked by the queue manager.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateBatchRequest {
    pub owner_id: Uuid,

    #[validate(length(min = 1, message = "a batch needs at least one item"))]
    pub items: Vec<JsonValue>,
}

#[derive(Debug, Serialize)]
pub struct BatchCreatedResponse {
    pub batch_id: Uuid,
    pub total_items: i32,
}
