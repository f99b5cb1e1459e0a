//! `schedule`: one scheduling pass against the configured store.

use uuid::Uuid;

use crate::services::Services;

pub struct ScheduleCommandHandler {
    services: Services,
}

impl ScheduleCommandHandler {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    pub async fn execute(&self, entity: Option<Uuid>) -> anyhow::Result<()> {
        match entity {
            Some(id) => {
                let jobs = self.services.engine.schedule_entity(id).await?;
                println!("Enqueued {} job(s) for entity {}", jobs.len(), id);
                for job in jobs {
                    println!("  {} {} at {}", job.id, job.job_type, job.scheduled_at);
                }
            }
            None => {
                let report = self.services.engine.schedule_all().await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
                if report.failed > 0 {
                    anyhow::bail!("{} entities failed to schedule", report.failed);
                }
            }
        }
        Ok(())
    }
}
