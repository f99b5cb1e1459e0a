//! Lifecycle and status of the engine's background components.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::batch::{BatchQueueManager, BatchQueueStatus};
use crate::error::AppResult;
use crate::jobs::{Dispatcher, DispatcherStatus, LoopExit, ScheduleReport, Scheduler};
use crate::models::Job;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub dispatcher: DispatcherStatus,
    pub scheduler_running: bool,
    pub batch_queue: BatchQueueStatus,
}

/// Which background components [`EngineService::start`] brings up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineComponents {
    pub dispatcher: bool,
    pub scheduler: bool,
    pub batch_queue: bool,
}

struct BatchLoop {
    token: CancellationToken,
    handle: JoinHandle<LoopExit>,
}

#[derive(Clone)]
pub struct EngineService {
    dispatcher: Arc<Dispatcher>,
    scheduler: Arc<Scheduler>,
    batches: Arc<BatchQueueManager>,
    batch_loop: Arc<Mutex<Option<BatchLoop>>>,
    halted: CancellationToken,
}

impl EngineService {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        scheduler: Arc<Scheduler>,
        batches: Arc<BatchQueueManager>,
    ) -> Self {
        Self {
            dispatcher,
            scheduler,
            batches,
            batch_loop: Arc::new(Mutex::new(None)),
            halted: CancellationToken::new(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn batches(&self) -> &Arc<BatchQueueManager> {
        &self.batches
    }

    pub async fn start(&self, components: EngineComponents) -> AppResult<()> {
        if components.scheduler {
            self.scheduler.start().await?;
        }
        if components.dispatcher {
            self.dispatcher.start().await;
        }
        if components.batch_queue {
            let mut batch_loop = self.batch_loop.lock().await;
            if batch_loop.is_none() {
                let token = CancellationToken::new();
                let batches = Arc::clone(&self.batches);
                let loop_token = token.clone();
                let halted = self.halted.clone();
                let handle = tokio::spawn(async move {
                    let exit = batches.run(loop_token).await;
                    if matches!(exit, LoopExit::Halted { .. }) {
                        halted.cancel();
                    }
                    exit
                });
                *batch_loop = Some(BatchLoop { token, handle });
            }
        }
        Ok(())
    }

    /// Resolves once the batch loop has halted after exhausting its retries.
    pub async fn halted(&self) {
        self.halted.cancelled().await
    }

    pub async fn stop(&self) -> AppResult<()> {
        self.scheduler.stop().await?;
        self.dispatcher.stop().await;
        self.stop_batch_loop().await;
        Ok(())
    }

    async fn stop_batch_loop(&self) -> Option<LoopExit> {
        let BatchLoop { token, handle } = self.batch_loop.lock().await.take()?;
        token.cancel();
        match handle.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                tracing::error!(error = %e, "Batch loop task ended abnormally");
                None
            }
        }
    }

    pub async fn status(&self) -> EngineStatus {
        EngineStatus {
            dispatcher: self.dispatcher.status().await,
            scheduler_running: self.scheduler.is_running().await,
            batch_queue: self.batches.status(),
        }
    }

    pub async fn schedule_entity(&self, entity_id: Uuid) -> AppResult<Vec<Job>> {
        self.scheduler.schedule_entity(entity_id).await
    }

    pub async fn schedule_all(&self) -> AppResult<ScheduleReport> {
        self.scheduler.run_once().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchQueueConfig, DispatcherConfig, SchedulerConfig};
    use crate::external::{ContentGenerator, ExternalError, GeneratedContent};
    use crate::jobs::JobTypeRegistry;
    use crate::repositories::MemoryStore;
    use async_trait::async_trait;
    use serde_json::Value as JsonValue;

    struct Unreachable;

    #[async_trait]
    impl ContentGenerator for Unreachable {
        async fn generate(&self, _payload: &JsonValue) -> Result<GeneratedContent, ExternalError> {
            Err(ExternalError::Other("offline".to_string()))
        }
    }

    fn engine(store: &Arc<MemoryStore>) -> EngineService {
        let dispatcher = Arc::new(Dispatcher::new(
            DispatcherConfig::default(),
            store.clone(),
            Arc::new(JobTypeRegistry::new()),
        ));
        let scheduler = Arc::new(Scheduler::new(
            SchedulerConfig::default(),
            store.clone(),
            store.clone(),
        ));
        let batches = Arc::new(BatchQueueManager::new(
            BatchQueueConfig::default(),
            store.clone(),
            Arc::new(Unreachable),
        ));
        EngineService::new(dispatcher, scheduler, batches)
    }

    #[tokio::test]
    async fn test_start_and_stop_selected_components() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);

        engine
            .start(EngineComponents {
                dispatcher: true,
                scheduler: false,
                batch_queue: true,
            })
            .await
            .unwrap();

        let status = engine.status().await;
        assert!(status.dispatcher.is_running);
        assert!(!status.scheduler_running);
        assert_eq!(status.dispatcher.max_concurrent_jobs, 5);

        engine.stop().await.unwrap();
        let status = engine.status().await;
        assert!(!status.dispatcher.is_running);
        assert!(!status.batch_queue.is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_halted_resolves_when_batch_loop_gives_up() {
        let store = Arc::new(MemoryStore::new());
        store.inject_batch_poll_faults(100);
        let engine = engine(&store);

        engine
            .start(EngineComponents {
                dispatcher: false,
                scheduler: false,
                batch_queue: true,
            })
            .await
            .unwrap();

        engine.halted().await;
        assert!(engine.status().await.batch_queue.halted);
        engine.stop().await.unwrap();
    }
}
