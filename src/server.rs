//! Composition root: builds the stores, collaborators and engine components
//! from [`Settings`], then serves the admin API until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::api::routes::create_router;
use crate::batch::BatchQueueManager;
use crate::config::{Environment, settings::Settings};
use crate::db::establish_async_connection_pool;
use crate::external::client::build_http_client;
use crate::external::{HttpContentGenerator, HttpPlatformClient};
use crate::jobs::{Dispatcher, Scheduler, tasks::default_registry};
use crate::repositories::{MemoryStore, Repositories};
use crate::services::{EngineComponents, EngineService, JobService, Services};
use crate::state::AppState;

pub struct Runtime {
    settings: Settings,
    in_memory: bool,
}

impl Runtime {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            in_memory: false,
        }
    }

    /// Back every store with process memory instead of Postgres.
    pub fn in_memory(mut self, in_memory: bool) -> Self {
        self.in_memory = in_memory;
        self
    }

    async fn repositories(&self) -> anyhow::Result<Repositories> {
        if self.in_memory {
            tracing::warn!("Using the in-memory store; nothing survives a restart");
            return Ok(Repositories::memory(Arc::new(MemoryStore::new())));
        }
        if self.settings.database.url.is_empty() {
            anyhow::bail!("database.url is not configured (pass --in-memory to run without Postgres)");
        }

        let pool = establish_async_connection_pool(&self.settings.database)
            .await
            .context("Failed to initialize database connection pool")?;
        Ok(Repositories::postgres(pool))
    }

    /// Wire every component without starting any background loop.
    pub async fn build_services(&self) -> anyhow::Result<Services> {
        let repos = self.repositories().await?;
        let collaborators = &self.settings.collaborators;

        let client = build_http_client(Duration::from_secs(collaborators.request_timeout_secs))
            .context("Failed to build HTTP client")?;
        let platforms = Arc::new(HttpPlatformClient::new(
            client.clone(),
            &collaborators.platform_query_url,
        ));
        let generator = Arc::new(HttpContentGenerator::new(
            client,
            &collaborators.content_generation_url,
        ));

        let registry = default_registry(repos.jobs.clone(), repos.entities.clone(), platforms);
        tracing::info!(job_types = ?registry.job_types(), "Job handlers registered");

        let dispatcher = Arc::new(Dispatcher::new(
            self.settings.dispatcher.clone(),
            repos.jobs.clone(),
            Arc::new(registry),
        ));
        let scheduler = Arc::new(Scheduler::new(
            self.settings.scheduler.clone(),
            repos.jobs.clone(),
            repos.entities.clone(),
        ));
        let batches = Arc::new(BatchQueueManager::new(
            self.settings.batch_queue.clone(),
            repos.batches.clone(),
            generator,
        ));

        Ok(Services::new(
            JobService::new(repos.jobs, repos.entities),
            EngineService::new(dispatcher, scheduler, batches),
        ))
    }

    fn components(&self) -> EngineComponents {
        EngineComponents {
            dispatcher: self.settings.dispatcher.enabled,
            scheduler: self.settings.scheduler.enabled,
            batch_queue: self.settings.batch_queue.enabled,
        }
    }

    /// Start the engine and serve the admin API until Ctrl+C, SIGTERM or the
    /// batch queue halting. The engine is stopped before returning; a halt is
    /// reported as an error so the process exits non-zero.
    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!(
            app_name = %self.settings.application.name,
            app_version = %self.settings.application.version,
            environment = %Environment::from_env(),
            "Application starting"
        );

        let services = self.build_services().await?;
        let engine = services.engine.clone();
        engine.start(self.components()).await?;

        let router = create_router(
            AppState::new(services),
            Duration::from_secs(self.settings.server.request_timeout),
        );

        let address = self.settings.server.address();
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind to {}", address))?;
        tracing::info!(address = %address, "Admin API listening");

        let halted = CancellationToken::new();
        let shutdown = {
            let engine = engine.clone();
            let halted = halted.clone();
            async move {
                tokio::select! {
                    _ = shutdown_signal() => {}
                    _ = engine.halted() => {
                        tracing::error!("Batch queue halted after repeated store failures, shutting down");
                        halted.cancel();
                    }
                }
            }
        };

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        engine.stop().await?;
        served.context("Admin API server failed")?;

        if halted.is_cancelled() {
            anyhow::bail!("batch queue halted");
        }
        tracing::info!("Shutdown complete");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM. A signal that cannot be installed is
/// logged and never fires, leaving the other one in charge.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_postgres_mode_requires_url() {
        let runtime = Runtime::new(Settings::default());
        let err = runtime.build_services().await.err().unwrap();
        assert!(err.to_string().contains("database.url"));
    }

    #[tokio::test]
    async fn test_in_memory_services_are_idle_until_started() {
        let runtime = Runtime::new(Settings::default()).in_memory(true);
        let services = runtime.build_services().await.unwrap();

        let status = services.engine.status().await;
        assert!(!status.dispatcher.is_running);
        assert!(!status.scheduler_running);
        assert!(!status.batch_queue.is_running);
        assert_eq!(services.jobs.queue_stats().await.unwrap().total, 0);
    }

    #[test]
    fn test_components_follow_enabled_flags() {
        let mut settings = Settings::default();
        settings.scheduler.enabled = false;
        let components = Runtime::new(settings).components();
        assert!(components.dispatcher);
        assert!(!components.scheduler);
        assert!(components.batch_queue);
    }
}
