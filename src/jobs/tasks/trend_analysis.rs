use std::sync::Arc;

use async_trait::async_trait;

use crate::jobs::error::{JobError, JobResult};
use crate::jobs::payload::{JobConfig, JobResults, TrendAnalysisResults, TrendDirection};
use crate::jobs::types::{JobContext, JobHandler};
use crate::models::JobType;
use crate::repositories::{EntityDirectory, JobStore};

/// Mention-rate change, in percentage points, below which a trend is stable.
const STABLE_BAND: f64 = 5.0;

/// Compares the newest brand scan against the average of the ones before it.
pub struct TrendAnalysisTask {
    entities: Arc<dyn EntityDirectory>,
    jobs: Arc<dyn JobStore>,
}

impl TrendAnalysisTask {
    pub fn new(entities: Arc<dyn EntityDirectory>, jobs: Arc<dyn JobStore>) -> Self {
        Self { entities, jobs }
    }
}

#[async_trait]
impl JobHandler for TrendAnalysisTask {
    fn job_type(&self) -> JobType {
        JobType::TrendAnalysis
    }

    async fn execute(&self, ctx: JobContext) -> JobResult<JobResults> {
        let JobConfig::TrendAnalysis(config) = &ctx.config else {
            return Err(JobError::InvalidConfig {
                job_type: JobType::TrendAnalysis,
                reason: format!("expected trend_analysis config, got {}", ctx.config.job_type()),
            });
        };

        if self.entities.get_entity(ctx.entity_id).await?.is_none() {
            return Err(JobError::EntityNotFound(ctx.entity_id));
        }

        let scans = self
            .jobs
            .recent_completed_jobs(ctx.entity_id, JobType::BrandScan, config.window as usize)
            .await?;
        ctx.progress.report(50).await;

        let mut results = TrendAnalysisResults::default();
        // Newest first.
        let mut rates = Vec::with_capacity(scans.len());
        for scan in &scans {
            match &scan.results {
                Some(JobResults::BrandScan(r)) => rates.push(r.mention_rate),
                _ => results
                    .errors
                    .push(format!("brand scan {} has no usable results", scan.id)),
            }
        }

        results.samples = rates.len() as u32;
        if let Some((&current, older)) = rates.split_first() {
            results.current_mention_rate = Some(current);
            if !older.is_empty() {
                let previous = older.iter().sum::<f64>() / older.len() as f64;
                let delta = current - previous;
                results.previous_mention_rate = Some(previous);
                results.delta = Some(delta);
                results.direction = if delta > STABLE_BAND {
                    TrendDirection::Rising
                } else if delta < -STABLE_BAND {
                    TrendDirection::Falling
                } else {
                    TrendDirection::Stable
                };
            }
        }

        Ok(JobResults::TrendAnalysis(results))
    }
}
