use std::collections::HashMap;
use std::sync::Arc;

use crate::jobs::types::JobHandler;
use crate::models::JobType;

/// Maps each job type to the handler that executes it.
#[derive(Clone, Default)]
pub struct JobTypeRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl JobTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own job type, replacing any previous one.
    pub fn register<H>(&mut self, handler: H) -> &mut Self
    where
        H: JobHandler + 'static,
    {
        let job_type = handler.job_type();
        if self.handlers.insert(job_type, Arc::new(handler)).is_some() {
            tracing::warn!(job_type = %job_type, "Replacing registered job handler");
        }
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    pub fn contains(&self, job_type: JobType) -> bool {
        self.handlers.contains_key(&job_type)
    }

    pub fn job_types(&self) -> Vec<JobType> {
        let mut types: Vec<JobType> = self.handlers.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::error::JobResult;
    use crate::jobs::payload::{JobResults, TrendAnalysisResults};
    use crate::jobs::types::JobContext;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl JobHandler for Noop {
        fn job_type(&self) -> JobType {
            JobType::TrendAnalysis
        }

        async fn execute(&self, _ctx: JobContext) -> JobResult<JobResults> {
            Ok(JobResults::TrendAnalysis(TrendAnalysisResults::default()))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = JobTypeRegistry::new();
        registry.register(Noop);

        assert!(registry.contains(JobType::TrendAnalysis));
        assert!(registry.get(JobType::BrandScan).is_none());
        assert_eq!(registry.job_types(), vec![JobType::TrendAnalysis]);
    }
}
