mod brand_scan;
mod recommendation_sync;
mod trend_analysis;

pub use brand_scan::BrandScanTask;
pub use recommendation_sync::RecommendationSyncTask;
pub use trend_analysis::TrendAnalysisTask;

use std::sync::Arc;

use crate::external::PlatformQuery;
use crate::jobs::registry::JobTypeRegistry;
use crate::repositories::{EntityDirectory, JobStore};

/// Registry with a handler for every recurring job type.
pub fn default_registry(
    jobs: Arc<dyn JobStore>,
    entities: Arc<dyn EntityDirectory>,
    platforms: Arc<dyn PlatformQuery>,
) -> JobTypeRegistry {
    let mut registry = JobTypeRegistry::new();
    registry
        .register(BrandScanTask::new(entities.clone(), platforms))
        .register(TrendAnalysisTask::new(entities.clone(), jobs.clone()))
        .register(RecommendationSyncTask::new(entities, jobs));
    registry
}
