//! CLI argument parsing with clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use uuid::Uuid;

/// Durable job scheduling and execution engine
#[derive(Parser, Debug)]
#[command(name = "beacon-rs")]
#[command(about = "Durable job scheduling and execution engine")]
#[command(long_about = "
beacon-rs schedules recurring monitoring jobs for tracked entities, executes
them under a bounded concurrency limit, and drains content-generation batches
in the background. An admin HTTP API exposes queue and engine state.

EXAMPLES:
    # Start the engine and admin API with default configuration
    beacon-rs serve

    # Run without Postgres, keeping all state in memory
    beacon-rs serve --in-memory

    # Use a custom configuration file
    beacon-rs --config /etc/beacon/production.toml serve

    # Check configuration without starting anything
    beacon-rs serve --dry-run

    # Run one scheduling pass over all monitored entities and exit
    beacon-rs schedule

    # Schedule a single entity
    beacon-rs schedule --entity 6f1c1f0e-8a52-4e3a-9d43-0f6a5f0f9c11

    # Print job queue statistics
    beacon-rs stats
")]
#[command(version = crate::clap_long_version())]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    ///
    /// Load a single TOML file instead of the layered `config/` directory.
    #[arg(short, long, value_name = "FILE", value_parser = super::validation::validate_config_file_path)]
    pub config: Option<PathBuf>,

    /// Override environment detection
    ///
    /// Selects the `{environment}.toml` overlay instead of `BEACON_APP_ENV`.
    #[arg(short, long, value_enum)]
    pub env: Option<Environment>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the engine and the admin API (default)
    ///
    /// Brings up the dispatcher, the scheduler sweep and the batch queue loop
    /// according to their `enabled` flags, then serves until Ctrl+C or SIGTERM.
    Serve {
        /// Host address to bind to
        #[arg(long, value_name = "ADDRESS", value_parser = super::validation::validate_host_address)]
        host: Option<String>,

        /// Port number to listen on
        #[arg(short, long, value_name = "PORT", value_parser = super::validation::validate_port)]
        port: Option<u16>,

        /// Log level override; takes precedence over --verbose/--quiet
        #[arg(long, value_enum)]
        log_level: Option<LogLevel>,

        /// Validate configuration and exit
        #[arg(long)]
        dry_run: bool,

        /// Keep all state in process memory instead of Postgres
        #[arg(long)]
        in_memory: bool,
    },
    /// Run one scheduling pass and exit
    ///
    /// Enqueues every due recurring job for all active monitored entities, or
    /// for one entity with --entity.
    Schedule {
        /// Only schedule this entity
        #[arg(long, value_name = "UUID")]
        entity: Option<Uuid>,
    },
    /// Print job counts per status as JSON
    Stats,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Environment {
    #[value(name = "development", alias = "dev")]
    Development,
    #[value(name = "staging")]
    Staging,
    #[value(name = "production", alias = "prod")]
    Production,
    #[value(name = "test")]
    Test,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogLevel {
    #[value(name = "error")]
    Error,
    #[value(name = "warn", alias = "warning")]
    Warn,
    #[value(name = "info")]
    Info,
    #[value(name = "debug")]
    Debug,
    #[value(name = "trace")]
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl From<Environment> for crate::config::Environment {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => crate::config::Environment::Development,
            Environment::Staging => crate::config::Environment::Staging,
            Environment::Production => crate::config::Environment::Production,
            Environment::Test => crate::config::Environment::Test,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_version_flag() {
        let err = Cli::try_parse_from(["beacon-rs", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_default_behavior() {
        let cli = Cli::try_parse_from(["beacon-rs"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose && !cli.quiet);
        assert!(cli.config.is_none() && cli.env.is_none());
    }

    #[test]
    fn test_serve_command() {
        let cli = Cli::try_parse_from([
            "beacon-rs",
            "serve",
            "--host",
            "0.0.0.0",
            "--port",
            "8080",
            "--in-memory",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Serve {
                host,
                port,
                dry_run,
                in_memory,
                ..
            }) => {
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(8080));
                assert!(!dry_run);
                assert!(in_memory);
            }
            other => panic!("expected Serve, got {:?}", other),
        }
    }

    #[test]
    fn test_schedule_command_parses_entity() {
        let cli = Cli::try_parse_from([
            "beacon-rs",
            "schedule",
            "--entity",
            "6f1c1f0e-8a52-4e3a-9d43-0f6a5f0f9c11",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::Schedule { entity: Some(_) })));

        let bad = Cli::try_parse_from(["beacon-rs", "schedule", "--entity", "acme"]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_env_aliases() {
        let cli = Cli::try_parse_from(["beacon-rs", "--env", "prod", "stats"]).unwrap();
        assert!(matches!(cli.env, Some(Environment::Production)));
        assert!(matches!(cli.command, Some(Commands::Stats)));
    }

    #[test]
    fn test_conflicting_verbose_quiet() {
        let err = Cli::try_parse_from(["beacon-rs", "--verbose", "--quiet"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }
}
