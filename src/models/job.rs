//! Job rows and their typed domain form.

use std::io::Write;
use std::str::FromStr;

use diesel::deserialize::{self, FromSql};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::{Text, Varchar};
use diesel::{AsExpression, FromSqlRow};
use diesel_derive_enum::DbEnum;
use jiff::{SignedDuration, Timestamp};
use jiff_diesel::ToDiesel;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::AppError;
use crate::jobs::payload::{JobConfig, JobResults};
use crate::schema::jobs;

/// Lifecycle: `pending -> running -> {completed | failed}`, or `pending -> cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::JobStatus")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Kind of work a job performs; stored as text in `jobs.job_type`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Varchar)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    BrandScan,
    TrendAnalysis,
    RecommendationSync,
}

impl JobType {
    /// Types the scheduler enqueues for every monitored entity, in scheduling order.
    pub const RECURRING: [JobType; 3] = [
        JobType::BrandScan,
        JobType::TrendAnalysis,
        JobType::RecommendationSync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::BrandScan => "brand_scan",
            JobType::TrendAnalysis => "trend_analysis",
            JobType::RecommendationSync => "recommendation_sync",
        }
    }

    /// Offset added to `scheduled_at` so a sweep does not start every type at once.
    pub fn stagger(&self) -> SignedDuration {
        match self {
            JobType::BrandScan => SignedDuration::ZERO,
            JobType::TrendAnalysis => SignedDuration::from_mins(5),
            JobType::RecommendationSync => SignedDuration::from_mins(10),
        }
    }
}

impl FromStr for JobType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brand_scan" => Ok(JobType::BrandScan),
            "trend_analysis" => Ok(JobType::TrendAnalysis),
            "recommendation_sync" => Ok(JobType::RecommendationSync),
            other => Err(AppError::validation(
                "job_type",
                format!("unknown job type '{}'", other),
            )),
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql<Varchar, Pg> for JobType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<Varchar, Pg> for JobType {
    fn from_sql(bytes: <Pg as diesel::backend::Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        s.parse::<JobType>()
            .map_err(|_| format!("Unrecognized job_type: {}", s).into())
    }
}

pub const DEFAULT_PRIORITY: i16 = 5;
pub const MAX_PRIORITY: i16 = 10;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct JobRow {
    pub id: Uuid,
    pub owner_entity_id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i16,
    pub scheduled_at: jiff_diesel::Timestamp,
    pub started_at: Option<jiff_diesel::Timestamp>,
    pub completed_at: Option<jiff_diesel::Timestamp>,
    pub error_message: Option<String>,
    pub progress: i16,
    pub results: Option<JsonValue>,
    pub config: JsonValue,
    pub created_at: jiff_diesel::Timestamp,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJobRow {
    pub id: Uuid,
    pub owner_entity_id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i16,
    pub scheduled_at: jiff_diesel::Timestamp,
    pub progress: i16,
    pub config: JsonValue,
    pub created_at: jiff_diesel::Timestamp,
}

/// A persisted unit of scheduled work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub owner_entity_id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i16,
    pub scheduled_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub progress: u8,
    pub results: Option<JobResults>,
    pub config: JobConfig,
    pub created_at: Timestamp,
}

impl TryFrom<JobRow> for Job {
    type Error = AppError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let config = JobConfig::decode(row.job_type, &row.config)?;
        let results = row
            .results
            .as_ref()
            .map(|value| JobResults::decode(row.job_type, value))
            .transpose()?;

        Ok(Self {
            id: row.id,
            owner_entity_id: row.owner_entity_id,
            job_type: row.job_type,
            status: row.status,
            priority: row.priority,
            scheduled_at: row.scheduled_at.to_jiff(),
            started_at: row.started_at.map(|t| t.to_jiff()),
            completed_at: row.completed_at.map(|t| t.to_jiff()),
            error_message: row.error_message,
            progress: row.progress.clamp(0, 100) as u8,
            results,
            config,
            created_at: row.created_at.to_jiff(),
        })
    }
}

/// Request to enqueue a job. `config` must match `job_type`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub owner_entity_id: Uuid,
    pub job_type: JobType,
    pub config: JobConfig,
    pub priority: i16,
    pub scheduled_at: Timestamp,
}

impl NewJob {
    pub fn new(owner_entity_id: Uuid, config: JobConfig, scheduled_at: Timestamp) -> Self {
        Self {
            owner_entity_id,
            job_type: config.job_type(),
            config,
            priority: DEFAULT_PRIORITY,
            scheduled_at,
        }
    }

    pub fn with_priority(mut self, priority: i16) -> Self {
        self.priority = priority;
        self
    }

    /// Materialize the pending job this request creates.
    pub fn into_job(self, id: Uuid, now: Timestamp) -> Job {
        Job {
            id,
            owner_entity_id: self.owner_entity_id,
            job_type: self.job_type,
            status: JobStatus::Pending,
            priority: self.priority,
            scheduled_at: self.scheduled_at,
            started_at: None,
            completed_at: None,
            error_message: None,
            progress: 0,
            results: None,
            config: self.config,
            created_at: now,
        }
    }

    pub fn to_row(&self, id: Uuid, now: Timestamp) -> NewJobRow {
        NewJobRow {
            id,
            owner_entity_id: self.owner_entity_id,
            job_type: self.job_type,
            status: JobStatus::Pending,
            priority: self.priority,
            scheduled_at: self.scheduled_at.to_diesel(),
            progress: 0,
            config: self.config.to_value(),
            created_at: now.to_diesel(),
        }
    }
}

/// Counts per status across all jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: u64,
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// `completed / (completed + failed) * 100`, 0 when nothing has finished
    pub success_rate: f64,
}

impl QueueStats {
    pub fn from_counts(counts: impl IntoIterator<Item = (JobStatus, u64)>) -> Self {
        let mut stats = QueueStats::default();
        for (status, count) in counts {
            match status {
                JobStatus::Pending => stats.pending += count,
                JobStatus::Running => stats.running += count,
                JobStatus::Completed => stats.completed += count,
                JobStatus::Failed => stats.failed += count,
                JobStatus::Cancelled => stats.cancelled += count,
            }
            stats.total += count;
        }

        let finished = stats.completed + stats.failed;
        stats.success_rate = if finished == 0 {
            0.0
        } else {
            stats.completed as f64 / finished as f64 * 100.0
        };
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_round_trip_names() {
        for job_type in JobType::RECURRING {
            assert_eq!(job_type.as_str().parse::<JobType>().unwrap(), job_type);
        }
        assert!("data_cleanup".parse::<JobType>().is_err());
    }

    #[test]
    fn test_stagger_offsets() {
        assert_eq!(JobType::BrandScan.stagger(), SignedDuration::ZERO);
        assert_eq!(JobType::TrendAnalysis.stagger(), SignedDuration::from_mins(5));
        assert_eq!(
            JobType::RecommendationSync.stagger(),
            SignedDuration::from_mins(10)
        );
    }

    #[test]
    fn test_queue_stats_success_rate() {
        let stats = QueueStats::from_counts([
            (JobStatus::Completed, 3),
            (JobStatus::Failed, 1),
            (JobStatus::Pending, 2),
            (JobStatus::Cancelled, 1),
        ]);
        assert_eq!(stats.total, 7);
        assert_eq!(stats.success_rate, 75.0);
    }

    #[test]
    fn test_queue_stats_empty() {
        let stats = QueueStats::from_counts([(JobStatus::Pending, 4)]);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.total, 4);
    }

    #[test]
    fn test_new_job_into_job_is_pending() {
        let now = Timestamp::now();
        let entity = Uuid::new_v4();
        let job = NewJob::new(entity, JobConfig::default_for(JobType::TrendAnalysis), now)
            .with_priority(9)
            .into_job(Uuid::new_v4(), now);

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.job_type, JobType::TrendAnalysis);
        assert_eq!(job.priority, 9);
        assert_eq!(job.progress, 0);
        assert!(job.started_at.is_none());
    }
}
