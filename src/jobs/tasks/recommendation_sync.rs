use std::sync::Arc;

use async_trait::async_trait;

use crate::jobs::error::{JobError, JobResult};
use crate::jobs::payload::{
    BrandScanResults, JobConfig, JobResults, Recommendation, RecommendationPriority,
    RecommendationSyncResults, TrendDirection,
};
use crate::jobs::types::{JobContext, JobHandler};
use crate::models::{JobType, MonitoredEntity, Platform};
use crate::repositories::{EntityDirectory, JobStore};

/// Rank beyond which a mention is considered weak.
const WEAK_RANK: u32 = 3;

/// Turns the latest brand scan and trend into a short list of actions.
pub struct RecommendationSyncTask {
    entities: Arc<dyn EntityDirectory>,
    jobs: Arc<dyn JobStore>,
}

impl RecommendationSyncTask {
    pub fn new(entities: Arc<dyn EntityDirectory>, jobs: Arc<dyn JobStore>) -> Self {
        Self { entities, jobs }
    }
}

#[async_trait]
impl JobHandler for RecommendationSyncTask {
    fn job_type(&self) -> JobType {
        JobType::RecommendationSync
    }

    async fn execute(&self, ctx: JobContext) -> JobResult<JobResults> {
        let JobConfig::RecommendationSync(config) = &ctx.config else {
            return Err(JobError::InvalidConfig {
                job_type: JobType::RecommendationSync,
                reason: format!(
                    "expected recommendation_sync config, got {}",
                    ctx.config.job_type()
                ),
            });
        };

        let entity = self
            .entities
            .get_entity(ctx.entity_id)
            .await?
            .ok_or(JobError::EntityNotFound(ctx.entity_id))?;

        let mut results = RecommendationSyncResults::default();
        let scan = self
            .jobs
            .last_completed_job(entity.id, JobType::BrandScan)
            .await?;
        ctx.progress.report(40).await;

        let Some(scan) = scan else {
            results
                .errors
                .push("no completed brand scan to base recommendations on".to_string());
            return Ok(JobResults::RecommendationSync(results));
        };
        results.source_job_id = Some(scan.id);

        match &scan.results {
            Some(JobResults::BrandScan(scan_results)) => {
                results.recommendations = from_scan(&entity, scan_results);
            }
            _ => results
                .errors
                .push(format!("brand scan {} has no usable results", scan.id)),
        }

        let trend = self
            .jobs
            .last_completed_job(entity.id, JobType::TrendAnalysis)
            .await?;
        if let Some(JobResults::TrendAnalysis(t)) = trend.and_then(|j| j.results)
            && t.direction == TrendDirection::Falling
        {
            results.recommendations.push(Recommendation {
                priority: RecommendationPriority::High,
                platform: None,
                query: None,
                message: format!(
                    "Mention rate for {} is falling ({:+.1} points)",
                    entity.name,
                    t.delta.unwrap_or_default()
                ),
            });
        }
        ctx.progress.report(80).await;

        results.recommendations.sort_by_key(|r| r.priority);
        results
            .recommendations
            .truncate(config.max_recommendations as usize);
        Ok(JobResults::RecommendationSync(results))
    }
}

fn from_scan(entity: &MonitoredEntity, scan: &BrandScanResults) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    let mentioned_on = |platform: Platform| scan.mentions.iter().any(|m| m.platform == platform);
    for platform in entity.platforms.iter().copied().filter(|p| !mentioned_on(*p)) {
        recommendations.push(Recommendation {
            priority: RecommendationPriority::High,
            platform: Some(platform),
            query: None,
            message: format!("{} is not mentioned on {}", entity.name, platform),
        });
    }

    for mention in &scan.mentions {
        if mention.sentiment == Some(crate::external::Sentiment::Negative) {
            recommendations.push(Recommendation {
                priority: RecommendationPriority::High,
                platform: Some(mention.platform),
                query: Some(mention.query.clone()),
                message: format!("Negative sentiment on {} for '{}'", mention.platform, mention.query),
            });
        }
        if let Some(rank) = mention.ranking_position.filter(|r| *r > WEAK_RANK) {
            recommendations.push(Recommendation {
                priority: RecommendationPriority::Medium,
                platform: Some(mention.platform),
                query: Some(mention.query.clone()),
                message: format!(
                    "Ranked #{} on {} for '{}'; aim for the top {}",
                    rank, mention.platform, mention.query, WEAK_RANK
                ),
            });
        }
    }

    if scan.combinations_checked > 0 && scan.mention_rate < 50.0 {
        recommendations.push(Recommendation {
            priority: RecommendationPriority::Low,
            platform: None,
            query: None,
            message: format!(
                "Mentioned in {:.0}% of answers; publish more content around tracked queries",
                scan.mention_rate
            ),
        });
    }

    recommendations
}
