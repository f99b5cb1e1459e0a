//! Dispatches a parsed command to its handler.

use super::handlers::{ScheduleCommandHandler, ServeCommandHandler, StatsCommandHandler};
use super::parser::{Cli, Commands};
use crate::config::settings::Settings;
use crate::server::Runtime;

/// No subcommand means `serve` with its defaults.
pub async fn execute_command(cli: &Cli, settings: Settings) -> anyhow::Result<()> {
    match &cli.command {
        Some(Commands::Serve {
            dry_run, in_memory, ..
        }) => {
            ServeCommandHandler::new(settings, *in_memory)
                .execute(*dry_run)
                .await
        }
        None => ServeCommandHandler::new(settings, false).execute(false).await,
        Some(Commands::Schedule { entity }) => {
            let services = Runtime::new(settings).build_services().await?;
            ScheduleCommandHandler::new(services).execute(*entity).await
        }
        Some(Commands::Stats) => {
            let services = Runtime::new(settings).build_services().await?;
            StatsCommandHandler::new(services).execute().await
        }
    }
}
