use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::JobType;

/// Unrecoverable handler failure. The dispatcher persists it as the job's
/// `error_message`; recoverable problems belong in `results.errors` instead.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Monitored entity not found: {0}")]
    EntityNotFound(Uuid),

    #[error("Invalid config for {job_type}: {reason}")]
    InvalidConfig { job_type: JobType, reason: String },

    #[error("No handler registered for job type {0}")]
    UnknownJobType(JobType),

    #[error("Job execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Job handler panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Store(#[from] AppError),
}

pub type JobResult<T> = Result<T, JobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_not_found_message() {
        let id = Uuid::nil();
        assert_eq!(
            JobError::EntityNotFound(id).to_string(),
            "Monitored entity not found: 00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_store_errors_are_transparent() {
        let err: JobError = AppError::not_found("Job", "id", 3).into();
        assert_eq!(err.to_string(), "Resource not found: Job with id=3");
    }
}
