//! Job-related DTOs for API requests and responses.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;
use crate::models::{Job, JobStatus, JobType};
use crate::services::QueueJob;

/// Request body for `POST /api/jobs`.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct QueueJobRequest {
    pub entity_id: Uuid,

    pub job_type: JobType,

    /// Per-type config; omitted fields take their defaults
    #[serde(default)]
    pub config: Option<JsonValue>,

    #[validate(range(min = 0, max = 10, message = "priority must be between 0 and 10"))]
    pub priority: Option<i16>,

    pub scheduled_at: Option<Timestamp>,
}

impl From<QueueJobRequest> for QueueJob {
    fn from(req: QueueJobRequest) -> Self {
        QueueJob {
            entity_id: req.entity_id,
            job_type: req.job_type,
            config: req.config,
            priority: req.priority,
            scheduled_at: req.scheduled_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub owner_entity_id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i16,
    pub progress: u8,
    pub scheduled_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub config: JsonValue,
    pub results: Option<JsonValue>,
    pub created_at: Timestamp,
}

impl JobResponse {
    pub fn from_job(job: Job) -> AppResult<Self> {
        let results = job.results.as_ref().map(|r| r.to_value()).transpose()?;
        Ok(Self {
            id: job.id,
            owner_entity_id: job.owner_entity_id,
            job_type: job.job_type,
            status: job.status,
            priority: job.priority,
            progress: job.progress,
            scheduled_at: job.scheduled_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error_message: job.error_message,
            config: job.config.to_value(),
            results,
            created_at: job.created_at,
        })
    }
}
