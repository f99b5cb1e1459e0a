//! Claims due jobs, executes them through the registry, and reaps stuck ones.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use jiff::{SignedDuration, Timestamp};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::error::AppResult;
use crate::jobs::error::JobError;
use crate::jobs::gate::ConcurrencyGate;
use crate::jobs::registry::JobTypeRegistry;
use crate::jobs::types::{JobContext, ProgressReporter};
use crate::models::Job;
use crate::repositories::JobStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Stuck jobs failed by the sweep
    pub swept: usize,
    /// Jobs claimed and handed to a handler
    pub claimed: usize,
    /// Due jobs that could not be claimed (already taken or gate full)
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatcherStatus {
    pub is_running: bool,
    pub currently_processing: Vec<Uuid>,
    pub max_concurrent_jobs: usize,
}

struct TickLoop {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Dispatcher {
    config: DispatcherConfig,
    jobs: Arc<dyn JobStore>,
    registry: Arc<JobTypeRegistry>,
    gate: ConcurrencyGate,
    in_flight: Mutex<JoinSet<()>>,
    tick_loop: Mutex<Option<TickLoop>>,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        jobs: Arc<dyn JobStore>,
        registry: Arc<JobTypeRegistry>,
    ) -> Self {
        let gate = ConcurrencyGate::new(config.max_concurrent_jobs);
        Self::with_gate(config, jobs, registry, gate)
    }

    pub fn with_gate(
        config: DispatcherConfig,
        jobs: Arc<dyn JobStore>,
        registry: Arc<JobTypeRegistry>,
        gate: ConcurrencyGate,
    ) -> Self {
        Self {
            config,
            jobs,
            registry,
            gate,
            in_flight: Mutex::new(JoinSet::new()),
            tick_loop: Mutex::new(None),
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Start ticking every `poll_interval`. A second call while running does nothing.
    pub async fn start(self: &Arc<Self>) {
        let mut tick_loop = self.tick_loop.lock().await;
        if tick_loop.is_some() {
            tracing::debug!("Dispatcher already running");
            return;
        }

        let token = CancellationToken::new();
        let this = Arc::clone(self);
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.config.poll_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = this.tick().await {
                            tracing::error!(error = %e, "Dispatcher tick failed");
                        }
                    }
                }
            }
        });

        *tick_loop = Some(TickLoop { token, handle });
        tracing::info!(
            poll_interval_secs = self.config.poll_interval_secs,
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "Dispatcher started"
        );
    }

    /// Stop ticking and wait up to the shutdown grace for in-flight jobs.
    ///
    /// Jobs still running after the grace are aborted and their slots freed;
    /// their rows stay `running` until a later stuck sweep fails them.
    pub async fn stop(&self) {
        let Some(TickLoop { token, handle }) = self.tick_loop.lock().await.take() else {
            return;
        };

        token.cancel();
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Dispatcher tick loop ended abnormally");
        }

        let grace = self.config.shutdown_grace();
        if tokio::time::timeout(grace, self.wait_idle()).await.is_err() {
            let mut in_flight = self.in_flight.lock().await;
            tracing::warn!(
                remaining = in_flight.len(),
                grace_secs = grace.as_secs(),
                "Aborting jobs still running after shutdown grace"
            );
            in_flight.abort_all();
            while in_flight.join_next().await.is_some() {}
            let released = self.gate.clear().await;
            tracing::debug!(released, "Released slots of aborted jobs");
        }

        tracing::info!("Dispatcher stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.tick_loop.lock().await.is_some()
    }

    pub async fn status(&self) -> DispatcherStatus {
        DispatcherStatus {
            is_running: self.is_running().await,
            currently_processing: self.gate.snapshot().await,
            max_concurrent_jobs: self.gate.capacity(),
        }
    }

    /// Wait for every spawned execution to finish.
    pub async fn wait_idle(&self) {
        let mut in_flight = self.in_flight.lock().await;
        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }
    }

    /// One dispatch cycle: sweep stuck jobs, then claim as many due jobs as
    /// the gate has room for.
    pub async fn tick(&self) -> AppResult<TickReport> {
        let now = Timestamp::now();
        let mut report = TickReport {
            swept: self.sweep_stuck(now).await?,
            ..TickReport::default()
        };
        self.reap_finished().await;

        let available = self.gate.available().await;
        if available == 0 {
            tracing::debug!("No free execution slots");
            return Ok(report);
        }

        let due = self.jobs.due_pending_jobs(now, available).await?;
        for job in due {
            if !self.gate.try_acquire(job.id).await {
                report.skipped += 1;
                continue;
            }

            match self.jobs.claim_job(job.id, now).await {
                Ok(true) => {
                    self.spawn_execution(job).await;
                    report.claimed += 1;
                }
                Ok(false) => {
                    // Cancelled or claimed elsewhere since selection.
                    self.gate.release(job.id).await;
                    report.skipped += 1;
                }
                Err(e) => {
                    self.gate.release(job.id).await;
                    tracing::warn!(job_id = %job.id, error = %e, "Failed to claim job");
                    report.skipped += 1;
                }
            }
        }

        if report != TickReport::default() {
            tracing::debug!(
                swept = report.swept,
                claimed = report.claimed,
                skipped = report.skipped,
                "Dispatcher tick"
            );
        }
        Ok(report)
    }

    async fn sweep_stuck(&self, now: Timestamp) -> AppResult<usize> {
        let cutoff = i64::try_from(self.config.job_timeout_secs)
            .ok()
            .and_then(|secs| now.checked_sub(SignedDuration::from_secs(secs)).ok());
        let Some(cutoff) = cutoff else {
            tracing::warn!(
                job_timeout_secs = self.config.job_timeout_secs,
                "Job timeout out of range; skipping stuck sweep"
            );
            return Ok(0);
        };
        let stuck = self.jobs.find_stuck_jobs(cutoff).await?;

        let mut swept = 0;
        for job in stuck {
            let message = format!(
                "Job exceeded timeout of {}s while running",
                self.config.job_timeout_secs
            );
            match self.jobs.fail_job(job.id, &message, now).await {
                Ok(true) => {
                    swept += 1;
                    tracing::warn!(job_id = %job.id, job_type = %job.job_type, "Failed stuck job after timeout");
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark stuck job as failed");
                    continue;
                }
            }
            self.gate.release(job.id).await;
        }
        Ok(swept)
    }

    async fn reap_finished(&self) {
        let mut in_flight = self.in_flight.lock().await;
        while let Some(joined) = in_flight.try_join_next() {
            log_join(joined);
        }
    }

    async fn spawn_execution(&self, job: Job) {
        let ctx = JobContext {
            job_id: job.id,
            entity_id: job.owner_entity_id,
            job_type: job.job_type,
            config: job.config,
            progress: ProgressReporter::new(job.id, Arc::clone(&self.jobs)),
        };
        let jobs = Arc::clone(&self.jobs);
        let registry = Arc::clone(&self.registry);
        let gate = self.gate.clone();

        self.in_flight
            .lock()
            .await
            .spawn(execute(ctx, jobs, registry, gate));
    }
}

async fn execute(
    ctx: JobContext,
    jobs: Arc<dyn JobStore>,
    registry: Arc<JobTypeRegistry>,
    gate: ConcurrencyGate,
) {
    let job_id = ctx.job_id;
    let job_type = ctx.job_type;
    tracing::info!(job_id = %job_id, job_type = %job_type, "Job started");

    let outcome = match registry.get(job_type) {
        Some(handler) => AssertUnwindSafe(handler.execute(ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(JobError::Panicked(panic_message(panic.as_ref())))),
        None => Err(JobError::UnknownJobType(job_type)),
    };

    let now = Timestamp::now();
    let written = match &outcome {
        Ok(results) => jobs.complete_job(job_id, results, now).await,
        Err(e) => jobs.fail_job(job_id, &e.to_string(), now).await,
    };

    match (written, &outcome) {
        (Ok(true), Ok(results)) => tracing::info!(
            job_id = %job_id,
            job_type = %job_type,
            sub_errors = results.errors().len(),
            "Job completed"
        ),
        (Ok(true), Err(e)) => {
            tracing::warn!(job_id = %job_id, job_type = %job_type, error = %e, "Job failed")
        }
        (Ok(false), _) => tracing::warn!(
            job_id = %job_id,
            job_type = %job_type,
            "Job was no longer running; outcome discarded"
        ),
        (Err(e), _) => tracing::error!(
            job_id = %job_id,
            job_type = %job_type,
            error = %e,
            "Failed to persist job outcome"
        ),
    }

    gate.release(job_id).await;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined
        && !e.is_cancelled()
    {
        tracing::error!(error = %e, "Job execution task ended abnormally");
    }
}
