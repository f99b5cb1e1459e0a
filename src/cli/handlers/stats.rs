use crate::services::Services;

/// `stats`: print queue statistics as JSON.
pub struct StatsCommandHandler {
    services: Services,
}

impl StatsCommandHandler {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    pub async fn execute(&self) -> anyhow::Result<()> {
        let stats = self.services.jobs.queue_stats().await?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
        Ok(())
    }
}
