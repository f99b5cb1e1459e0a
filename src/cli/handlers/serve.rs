//! `serve`: dry-run validation or the full runtime.

use crate::config::settings::Settings;
use crate::server::Runtime;

pub struct ServeCommandHandler {
    config: Settings,
    in_memory: bool,
}

impl ServeCommandHandler {
    pub fn new(config: Settings, in_memory: bool) -> Self {
        Self { config, in_memory }
    }

    pub async fn execute(self, dry_run: bool) -> anyhow::Result<()> {
        if dry_run {
            return self.validate_only();
        }
        Runtime::new(self.config).in_memory(self.in_memory).run().await
    }

    /// Check everything `serve` would need without opening a connection.
    pub fn validate_only(&self) -> anyhow::Result<()> {
        self.config.validate()?;
        if !self.in_memory && self.config.database.url.is_empty() {
            anyhow::bail!("database.url is not configured (pass --in-memory to run without Postgres)");
        }

        println!("✓ Configuration is valid");
        println!("✓ Admin API would bind to: {}", self.config.server.address());
        println!(
            "✓ Dispatcher: {} (max {} concurrent jobs)",
            enabled(self.config.dispatcher.enabled),
            self.config.dispatcher.max_concurrent_jobs
        );
        println!(
            "✓ Scheduler: {} (cron '{}')",
            enabled(self.config.scheduler.enabled),
            self.config.scheduler.cron
        );
        println!(
            "✓ Batch queue: {} (concurrency {})",
            enabled(self.config.batch_queue.enabled),
            self.config.batch_queue.concurrency
        );
        println!(
            "✓ Store: {}",
            if self.in_memory { "in-memory" } else { "postgres" }
        );
        println!("Dry run completed successfully");
        Ok(())
    }
}

fn enabled(flag: bool) -> &'static str {
    if flag { "enabled" } else { "disabled" }
}
