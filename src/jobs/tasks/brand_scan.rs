use std::sync::Arc;

use async_trait::async_trait;

use crate::external::PlatformQuery;
use crate::jobs::error::{JobError, JobResult};
use crate::jobs::payload::{BrandScanResults, JobConfig, JobResults, MentionRecord};
use crate::jobs::types::{JobContext, JobHandler};
use crate::models::JobType;
use crate::repositories::EntityDirectory;

/// Asks every configured platform every tracking query and tallies mentions.
pub struct BrandScanTask {
    entities: Arc<dyn EntityDirectory>,
    platforms: Arc<dyn PlatformQuery>,
}

impl BrandScanTask {
    pub fn new(entities: Arc<dyn EntityDirectory>, platforms: Arc<dyn PlatformQuery>) -> Self {
        Self {
            entities,
            platforms,
        }
    }
}

#[async_trait]
impl JobHandler for BrandScanTask {
    fn job_type(&self) -> JobType {
        JobType::BrandScan
    }

    async fn execute(&self, ctx: JobContext) -> JobResult<JobResults> {
        let JobConfig::BrandScan(config) = &ctx.config else {
            return Err(JobError::InvalidConfig {
                job_type: JobType::BrandScan,
                reason: format!("expected brand_scan config, got {}", ctx.config.job_type()),
            });
        };

        let entity = self
            .entities
            .get_entity(ctx.entity_id)
            .await?
            .ok_or(JobError::EntityNotFound(ctx.entity_id))?;

        let queries = config
            .queries
            .clone()
            .unwrap_or_else(|| entity.tracking_queries.clone());
        let platforms = config
            .platforms
            .clone()
            .unwrap_or_else(|| entity.platforms.clone());
        if queries.is_empty() || platforms.is_empty() {
            return Err(JobError::InvalidConfig {
                job_type: JobType::BrandScan,
                reason: "no queries or platforms to scan".to_string(),
            });
        }

        let total = queries.len() * platforms.len();
        let mut results = BrandScanResults::default();
        let mut answered = 0u32;
        let mut rankings = Vec::new();

        for platform in &platforms {
            for query in &queries {
                match self
                    .platforms
                    .query_platform(*platform, query, &entity.name)
                    .await
                {
                    Ok(found) => {
                        answered += 1;
                        if found.mentioned {
                            results.mentions_found += 1;
                            if let Some(rank) = found.ranking_position {
                                rankings.push(rank);
                            }
                            if let Some(sentiment) = found.sentiment {
                                results.sentiment.record(sentiment);
                            }
                            results.mentions.push(MentionRecord {
                                platform: *platform,
                                query: query.clone(),
                                ranking_position: found.ranking_position,
                                sentiment: found.sentiment,
                                snippet: found.snippet,
                            });
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            job_id = %ctx.job_id,
                            platform = %platform,
                            query = %query,
                            error = %e,
                            "Platform query failed"
                        );
                        results.errors.push(format!("{}/{}: {}", platform, query, e));
                    }
                }

                results.combinations_checked += 1;
                ctx.progress
                    .report_fraction(results.combinations_checked as usize, total)
                    .await;
            }
        }

        if answered > 0 {
            results.mention_rate = results.mentions_found as f64 / answered as f64 * 100.0;
        }
        if !rankings.is_empty() {
            results.average_ranking_position =
                Some(rankings.iter().map(|&r| r as f64).sum::<f64>() / rankings.len() as f64);
        }

        Ok(JobResults::BrandScan(results))
    }

    fn description(&self) -> Option<String> {
        Some("Query LLM platforms for brand mentions".to_string())
    }
}
