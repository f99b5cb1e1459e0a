//! Data Transfer Objects for API requests and responses.

mod batch;
mod error;
mod health;
mod job;

pub use batch::{BatchCreatedResponse, CreateBatchRequest};
pub use error::ErrorResponse;
pub use health::{ComponentHealth, HealthResponse, HealthStatus};
pub use job::{JobResponse, QueueJobRequest};
