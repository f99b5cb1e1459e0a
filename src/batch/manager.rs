use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{StreamExt, stream};
use jiff::Timestamp;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::batch::events::{BatchEvent, BatchListener, BatchObservers, Subscription};
use crate::config::BatchQueueConfig;
use crate::error::{AppError, AppResult};
use crate::external::ContentGenerator;
use crate::jobs::backoff::{LoopExit, PollOutcome, RetryPolicy, supervise};
use crate::models::{Batch, BatchItem};
use crate::repositories::BatchStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchQueueStatus {
    pub is_running: bool,
    pub halted: bool,
    pub concurrency: usize,
    pub subscribers: usize,
}

/// Drains content-generation batches one at a time through a bounded item pool.
pub struct BatchQueueManager {
    config: BatchQueueConfig,
    batches: Arc<dyn BatchStore>,
    generator: Arc<dyn ContentGenerator>,
    observers: BatchObservers,
    running: AtomicBool,
    halted: AtomicBool,
}

impl BatchQueueManager {
    pub fn new(
        config: BatchQueueConfig,
        batches: Arc<dyn BatchStore>,
        generator: Arc<dyn ContentGenerator>,
    ) -> Self {
        Self {
            config,
            batches,
            generator,
            observers: BatchObservers::new(),
            running: AtomicBool::new(false),
            halted: AtomicBool::new(false),
        }
    }

    /// Persist a `pending` batch with one item per payload. Processing happens
    /// later in the polling loop.
    pub async fn create_batch(&self, owner_id: Uuid, items: Vec<JsonValue>) -> AppResult<Batch> {
        let max = self.config.max_batch_items;
        if items.is_empty() || items.len() > max {
            return Err(AppError::validation(
                "items",
                format!("a batch needs between 1 and {} items, got {}", max, items.len()),
            ));
        }

        let batch = self
            .batches
            .create_batch(owner_id, items, Timestamp::now())
            .await?;
        tracing::info!(batch_id = %batch.id, owner_id = %owner_id, total = batch.total_items, "Batch created");
        Ok(batch)
    }

    pub async fn get_batch(&self, id: Uuid) -> AppResult<Batch> {
        self.batches
            .get_batch(id)
            .await?
            .ok_or_else(|| AppError::not_found("Batch", "id", id))
    }

    pub async fn list_items(&self, id: Uuid) -> AppResult<Vec<BatchItem>> {
        self.get_batch(id).await?;
        self.batches.list_items(id).await
    }

    pub fn subscribe(&self, listener: BatchListener) -> Subscription {
        self.observers.subscribe(listener)
    }

    pub fn status(&self) -> BatchQueueStatus {
        BatchQueueStatus {
            is_running: self.running.load(Ordering::SeqCst),
            halted: self.halted.load(Ordering::SeqCst),
            concurrency: self.config.concurrency,
            subscribers: self.observers.len(),
        }
    }

    /// Poll until cancelled, backing off on faults. Returns
    /// [`LoopExit::Halted`] once `max_retries` consecutive polls have failed.
    pub async fn run(&self, token: CancellationToken) -> LoopExit {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(concurrency = self.config.concurrency, "Batch queue started");

        let exit = supervise(
            "batch_queue",
            RetryPolicy::from(&self.config),
            self.config.poll_interval(),
            token,
            || self.poll_once(),
        )
        .await;

        self.running.store(false, Ordering::SeqCst);
        if matches!(exit, LoopExit::Halted { .. }) {
            self.halted.store(true, Ordering::SeqCst);
        }
        tracing::info!(exit = ?exit, "Batch queue stopped");
        exit
    }

    /// Drain one batch: a `processing` batch left over from a previous run
    /// first, otherwise the oldest `pending` one.
    pub async fn poll_once(&self) -> AppResult<PollOutcome> {
        let Some(batch) = self.batches.next_batch_to_drain().await? else {
            return Ok(PollOutcome::Idle);
        };

        if !self.batches.mark_batch_processing(batch.id).await? {
            tracing::debug!(batch_id = %batch.id, "Batch no longer drainable");
            return Ok(PollOutcome::Worked);
        }

        let items = self.batches.drainable_items(batch.id).await?;
        let drained = items.len();
        tracing::info!(batch_id = %batch.id, remaining = drained, total = batch.total_items, "Draining batch");

        let concurrency = self.config.concurrency.max(1);
        let outcomes: Vec<AppResult<()>> = stream::iter(items)
            .map(|item| self.process_item(item))
            .buffer_unordered(concurrency)
            .collect()
            .await;
        if let Some(err) = outcomes.into_iter().find_map(Result::err) {
            return Err(err);
        }

        let finished = self.finish_if_settled(batch.id).await?;
        // Nothing drained and nothing finished: wait a poll interval instead of spinning.
        Ok(if drained > 0 || finished {
            PollOutcome::Worked
        } else {
            PollOutcome::Idle
        })
    }

    async fn process_item(&self, item: BatchItem) -> AppResult<()> {
        if !self
            .batches
            .mark_item_processing(item.id, Timestamp::now())
            .await?
        {
            return Ok(());
        }

        let settled = match self.generator.generate(&item.payload).await {
            Ok(content) => {
                self.batches
                    .complete_item(item.id, &content.result_ref, Timestamp::now())
                    .await?
            }
            Err(e) => {
                tracing::warn!(
                    batch_id = %item.batch_id,
                    item_id = %item.id,
                    position = item.position,
                    error = %e,
                    "Batch item failed"
                );
                self.batches
                    .fail_item(item.id, &e.to_string(), Timestamp::now())
                    .await?
            }
        };

        if let Some(batch) = settled {
            let progress = batch.computed_progress();
            self.batches.update_batch_progress(batch.id, progress).await?;
            self.observers.emit(&BatchEvent::Progress {
                batch_id: batch.id,
                progress,
                completed: batch.completed_items,
                failed: batch.failed_items,
                total: batch.total_items,
            });
        }
        Ok(())
    }

    /// Move a fully settled batch to its terminal status. Returns whether the
    /// batch finished.
    async fn finish_if_settled(&self, batch_id: Uuid) -> AppResult<bool> {
        let mut batch = self.get_batch(batch_id).await?;
        if batch.terminal_status().is_none() && self.batches.drainable_items(batch_id).await?.is_empty() {
            // Every item is settled but the counters lag behind the item rows.
            if let Some(reconciled) = self.batches.reconcile_batch_counts(batch_id).await? {
                tracing::warn!(
                    batch_id = %batch_id,
                    completed = reconciled.completed_items,
                    failed = reconciled.failed_items,
                    "Batch counters reconciled from item statuses"
                );
                batch = reconciled;
            }
        }

        let Some(status) = batch.terminal_status() else {
            tracing::warn!(
                batch_id = %batch_id,
                settled = batch.settled(),
                total = batch.total_items,
                "Batch drained with unsettled items; will resume on next poll"
            );
            return Ok(false);
        };

        let error = batch.failure_summary();
        self.batches.update_batch_progress(batch_id, 100).await?;
        if self
            .batches
            .finish_batch(batch_id, status, error.as_deref(), Timestamp::now())
            .await?
        {
            tracing::info!(
                batch_id = %batch_id,
                status = ?status,
                completed = batch.completed_items,
                failed = batch.failed_items,
                "Batch finished"
            );
            self.observers.emit(&BatchEvent::Completed {
                batch_id,
                status,
                error,
            });
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{ExternalError, GeneratedContent};
    use crate::models::{BatchStatus, ItemStatus};
    use crate::repositories::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Fails payloads carrying `"fail": true`; tracks peak concurrency.
    #[derive(Default)]
    struct FakeGenerator {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ContentGenerator for FakeGenerator {
        async fn generate(&self, payload: &JsonValue) -> Result<GeneratedContent, ExternalError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if payload["fail"] == json!(true) {
                return Err(ExternalError::Other("generation rejected".to_string()));
            }
            Ok(GeneratedContent {
                result_ref: format!("article-{}", payload["keyword"].as_str().unwrap_or("?")),
            })
        }
    }

    fn manager(store: &Arc<MemoryStore>, generator: &Arc<FakeGenerator>) -> BatchQueueManager {
        let config = BatchQueueConfig {
            concurrency: 3,
            max_batch_items: 10,
            ..BatchQueueConfig::default()
        };
        BatchQueueManager::new(config, store.clone(), generator.clone())
    }

    fn payloads(outcomes: &[bool]) -> Vec<JsonValue> {
        outcomes
            .iter()
            .enumerate()
            .map(|(i, ok)| json!({"keyword": format!("k{}", i), "fail": !ok}))
            .collect()
    }

    fn record(manager: &BatchQueueManager) -> (Arc<Mutex<Vec<BatchEvent>>>, Subscription) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let subscription =
            manager.subscribe(Arc::new(move |e: &BatchEvent| sink.lock().unwrap().push(e.clone())));
        (events, subscription)
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_outcomes_end_partial() {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(FakeGenerator::default());
        let manager = manager(&store, &generator);
        let (events, _subscription) = record(&manager);
        let owner = Uuid::new_v4();

        let batch = manager
            .create_batch(owner, payloads(&[true, false, true, false, false]))
            .await
            .unwrap();
        assert_eq!(batch.status, BatchStatus::Pending);

        assert_eq!(manager.poll_once().await.unwrap(), PollOutcome::Worked);

        let done = manager.get_batch(batch.id).await.unwrap();
        assert_eq!(done.completed_items, 2);
        assert_eq!(done.failed_items, 3);
        assert_eq!(done.status, BatchStatus::Partial);
        assert_eq!(done.progress, 100);
        assert_eq!(done.error.as_deref(), Some("3 of 5 items failed"));
        assert!(done.completed_at.is_some());
        assert!(generator.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(store.usage_for_owner(owner).await.unwrap(), 2);

        let items = manager.list_items(batch.id).await.unwrap();
        assert_eq!(items[0].status, ItemStatus::Completed);
        assert_eq!(items[0].result_ref.as_deref(), Some("article-k0"));
        assert_eq!(items[1].status, ItemStatus::Failed);

        let events = events.lock().unwrap();
        let progress: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Progress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress.len(), 5);
        assert_eq!(progress.iter().max(), Some(&100));
        assert!(matches!(
            events.last(),
            Some(BatchEvent::Completed { status: BatchStatus::Partial, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_pool_reaches_but_never_exceeds_concurrency() {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(FakeGenerator::default());
        let manager = manager(&store, &generator);
        let batch = manager
            .create_batch(Uuid::new_v4(), payloads(&[true; 8]))
            .await
            .unwrap();

        manager.poll_once().await.unwrap();
        assert_eq!(generator.peak.load(Ordering::SeqCst), 3);
        assert_eq!(
            manager.get_batch(batch.id).await.unwrap().status,
            BatchStatus::Completed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failed_batch_is_failed() {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(FakeGenerator::default());
        let manager = manager(&store, &generator);
        let batch = manager
            .create_batch(Uuid::new_v4(), payloads(&[false, false]))
            .await
            .unwrap();

        manager.poll_once().await.unwrap();
        let done = manager.get_batch(batch.id).await.unwrap();
        assert_eq!(done.status, BatchStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("2 of 2 items failed"));
    }

    #[tokio::test]
    async fn test_item_count_is_validated() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store, &Arc::new(FakeGenerator::default()));

        for items in [vec![], payloads(&[true; 11])] {
            let err = manager.create_batch(Uuid::new_v4(), items).await.unwrap_err();
            assert!(matches!(err, AppError::Validation { field, .. } if field == "items"));
        }
        assert_eq!(manager.poll_once().await.unwrap(), PollOutcome::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_batch_is_resumed_before_pending_ones() {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(FakeGenerator::default());
        let manager = manager(&store, &generator);
        let now = Timestamp::now();

        let waiting = manager
            .create_batch(Uuid::new_v4(), payloads(&[true]))
            .await
            .unwrap();
        let interrupted = manager
            .create_batch(Uuid::new_v4(), payloads(&[true, true, false]))
            .await
            .unwrap();

        // State left behind by a crash: one item done, one mid-flight.
        store.mark_batch_processing(interrupted.id).await.unwrap();
        let items = store.list_items(interrupted.id).await.unwrap();
        store.mark_item_processing(items[0].id, now).await.unwrap();
        store.complete_item(items[0].id, "article-k0", now).await.unwrap();
        store.mark_item_processing(items[1].id, now).await.unwrap();

        manager.poll_once().await.unwrap();
        let resumed = manager.get_batch(interrupted.id).await.unwrap();
        assert_eq!(resumed.status, BatchStatus::Partial);
        assert_eq!((resumed.completed_items, resumed.failed_items), (2, 1));
        assert_eq!(
            manager.get_batch(waiting.id).await.unwrap().status,
            BatchStatus::Pending
        );

        manager.poll_once().await.unwrap();
        assert_eq!(
            manager.get_batch(waiting.id).await.unwrap().status,
            BatchStatus::Completed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_batch_with_lagging_counters_still_finishes() {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(FakeGenerator::default());
        let manager = manager(&store, &generator);
        let now = Timestamp::now();

        let lagging = manager
            .create_batch(Uuid::new_v4(), payloads(&[true, false]))
            .await
            .unwrap();
        let behind = manager
            .create_batch(Uuid::new_v4(), payloads(&[true]))
            .await
            .unwrap();

        // Item rows settled, but the failure never reached failed_items.
        store.mark_batch_processing(lagging.id).await.unwrap();
        let items = store.list_items(lagging.id).await.unwrap();
        store.mark_item_processing(items[0].id, now).await.unwrap();
        store.complete_item(items[0].id, "article-k0", now).await.unwrap();
        store.force_item_status(items[1].id, ItemStatus::Failed).await;

        assert_eq!(manager.poll_once().await.unwrap(), PollOutcome::Worked);
        let done = manager.get_batch(lagging.id).await.unwrap();
        assert_eq!(done.status, BatchStatus::Partial);
        assert_eq!((done.completed_items, done.failed_items), (1, 1));
        assert_eq!(done.progress, 100);

        assert_eq!(manager.poll_once().await.unwrap(), PollOutcome::Worked);
        assert_eq!(
            manager.get_batch(behind.id).await.unwrap().status,
            BatchStatus::Completed
        );
        assert_eq!(manager.poll_once().await.unwrap(), PollOutcome::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_recovers_from_transient_poll_faults() {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(FakeGenerator::default());
        let manager = Arc::new(manager(&store, &generator));
        let batch = manager
            .create_batch(Uuid::new_v4(), payloads(&[true, true]))
            .await
            .unwrap();
        store.inject_batch_poll_faults(3);

        let token = CancellationToken::new();
        let handle = tokio::spawn({
            let manager = manager.clone();
            let token = token.clone();
            async move { manager.run(token).await }
        });

        while manager.get_batch(batch.id).await.unwrap().status != BatchStatus::Completed {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(manager.status().is_running);

        token.cancel();
        assert_eq!(handle.await.unwrap(), LoopExit::Stopped);
        let status = manager.status();
        assert!(!status.is_running);
        assert!(!status.halted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_halts_after_max_retries() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store, &Arc::new(FakeGenerator::default()));
        store.inject_batch_poll_faults(10);

        let exit = manager.run(CancellationToken::new()).await;
        assert_eq!(exit, LoopExit::Halted { failures: 5 });
        assert!(manager.status().halted);
    }
}
