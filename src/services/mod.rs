//! Service layer for business logic operations.
//!
//! Services sit between the admin API / CLI and the stores and engine
//! components, validating input and mapping outcomes onto `AppError`.

mod engine_service;
mod job_service;

pub use engine_service::{EngineComponents, EngineService, EngineStatus};
pub use job_service::{JobService, QueueJob};

use std::sync::Arc;

use crate::batch::BatchQueueManager;

/// Aggregates all services for convenient access.
///
/// Cloning is cheap; every member shares its state through `Arc`.
#[derive(Clone)]
pub struct Services {
    pub jobs: JobService,
    pub engine: EngineService,
}

impl Services {
    pub fn new(jobs: JobService, engine: EngineService) -> Self {
        Self { jobs, engine }
    }

    pub fn batches(&self) -> &Arc<BatchQueueManager> {
        self.engine.batches()
    }
}
