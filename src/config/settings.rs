//! Configuration settings structures for beacon-rs
//!
//! This module defines all configuration structures that can be loaded from
//! TOML files and environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::error::ConfigError;
use crate::logger::{ConsoleConfig, FileConfig, LogFormat, LoggerConfig, RotationConfig};

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "beacon-rs".to_string()
}

fn default_app_version() -> String {
    crate::pkg_version().to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_path() -> String {
    "logs/beacon.log".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_max_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_max_files() -> usize {
    5
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_max_concurrent_jobs() -> usize {
    5
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_shutdown_grace_ticks() -> u32 {
    3
}

fn default_scheduler_cron() -> String {
    "0 */15 * * * *".to_string()
}

fn default_batch_concurrency() -> usize {
    3
}

fn default_batch_poll_interval_secs() -> u64 {
    5
}

fn default_max_batch_items() -> usize {
    100
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_retry_max_delay_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    5
}

fn default_platform_query_url() -> String {
    "http://127.0.0.1:8081/v1/platform-query".to_string()
}

fn default_content_generation_url() -> String {
    "http://127.0.0.1:8082/v1/generate".to_string()
}

fn default_collaborator_timeout() -> u64 {
    30
}

// ============================================================================
// Application Configuration
// ============================================================================

/// Application basic information configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Application version
    #[serde(default = "default_app_version")]
    pub version: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
        }
    }
}

// ============================================================================
// Server Configuration
// ============================================================================

/// Admin HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl ServerConfig {
    /// Get the full server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
        }
    }
}

// ============================================================================
// Database Configuration
// ============================================================================

/// Diesel database connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout: default_connection_timeout(),
        }
    }
}

// ============================================================================
// Logger Settings
// ============================================================================

/// Console output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    /// Whether console output is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether to use colored output
    #[serde(default = "default_true")]
    pub colored: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            colored: default_true(),
        }
    }
}

/// Size-based rotation settings for file logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationSettings {
    /// Maximum file size in bytes before rotation
    #[serde(default = "default_max_size")]
    pub max_size: u64,

    /// Maximum number of rotated files to keep
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            max_files: default_max_files(),
        }
    }
}

/// File output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    /// Whether file output is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Path to the log file
    #[serde(default = "default_log_path")]
    pub path: String,

    /// Whether to append to existing file
    #[serde(default = "default_true")]
    pub append: bool,

    /// Log format: "full", "compact", or "json"
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Rotation settings
    #[serde(default)]
    pub rotation: RotationSettings,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_log_path(),
            append: default_true(),
            format: default_log_format(),
            rotation: RotationSettings::default(),
        }
    }
}

/// Logger configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Console output settings
    #[serde(default)]
    pub console: ConsoleSettings,

    /// File output settings
    #[serde(default)]
    pub file: FileSettings,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: ConsoleSettings::default(),
            file: FileSettings::default(),
        }
    }
}

impl LoggerSettings {
    /// Convert LoggerSettings to the runtime LoggerConfig
    pub fn into_logger_config(self) -> Result<LoggerConfig, ConfigError> {
        let console = ConsoleConfig::new(self.console.enabled, self.console.colored);
        let file = self.file.into_file_config()?;

        LoggerConfig::new(console, file, self.level).map_err(|e| ConfigError::ValidationError {
            field: "logger".to_string(),
            message: e.to_string(),
        })
    }
}

impl FileSettings {
    /// Convert FileSettings to FileConfig
    pub fn into_file_config(self) -> Result<FileConfig, ConfigError> {
        let format = self
            .format
            .parse::<LogFormat>()
            .map_err(|e| ConfigError::ValidationError {
                field: "logger.file.format".to_string(),
                message: e.to_string(),
            })?;
        let rotation = RotationConfig::new(self.rotation.max_size, self.rotation.max_files);

        FileConfig::new(
            self.enabled,
            PathBuf::from(self.path),
            self.append,
            format,
            rotation,
        )
        .map_err(|e| ConfigError::ValidationError {
            field: "logger.file".to_string(),
            message: e.to_string(),
        })
    }
}

// ============================================================================
// Dispatcher Configuration
// ============================================================================

/// Job dispatcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Whether the dispatcher tick loop runs in `serve`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between dispatcher ticks
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound on simultaneously executing jobs
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Seconds a job may stay `running` before the stuck sweep fails it
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Poll intervals `stop()` waits for in-flight jobs before aborting them
    #[serde(default = "default_shutdown_grace_ticks")]
    pub shutdown_grace_ticks: u32,
}

impl DispatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// Total time `stop()` waits for in-flight jobs.
    pub fn shutdown_grace(&self) -> Duration {
        self.poll_interval()
            .checked_mul(self.shutdown_grace_ticks)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            poll_interval_secs: default_poll_interval_secs(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            job_timeout_secs: default_job_timeout_secs(),
            shutdown_grace_ticks: default_shutdown_grace_ticks(),
        }
    }
}

// ============================================================================
// Scheduler Configuration
// ============================================================================

/// Recurring-job scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the cron-driven scheduling sweep runs in `serve`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Six-field cron expression (with seconds) for the scheduling sweep
    #[serde(default = "default_scheduler_cron")]
    pub cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            cron: default_scheduler_cron(),
        }
    }
}

// ============================================================================
// Batch Queue Configuration
// ============================================================================

/// Content-generation batch queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchQueueConfig {
    /// Whether the batch polling loop runs in `serve`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Items of the active batch processed at once
    #[serde(default = "default_batch_concurrency")]
    pub concurrency: usize,

    /// Seconds to sleep when no batch is waiting
    #[serde(default = "default_batch_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Largest accepted batch
    #[serde(default = "default_max_batch_items")]
    pub max_batch_items: usize,

    /// First backoff delay after a loop fault
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Backoff ceiling
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Consecutive faults after which the loop halts for good
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl BatchQueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for BatchQueueConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            concurrency: default_batch_concurrency(),
            poll_interval_secs: default_batch_poll_interval_secs(),
            max_batch_items: default_max_batch_items(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

// ============================================================================
// External Collaborators
// ============================================================================

/// Endpoints of the platform-query and content-generation services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorsConfig {
    #[serde(default = "default_platform_query_url")]
    pub platform_query_url: String,

    #[serde(default = "default_content_generation_url")]
    pub content_generation_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_collaborator_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            platform_query_url: default_platform_query_url(),
            content_generation_url: default_content_generation_url(),
            request_timeout_secs: default_collaborator_timeout(),
        }
    }
}

// ============================================================================
// Root Settings
// ============================================================================

/// Complete application settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub application: ApplicationConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logger: LoggerSettings,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub batch_queue: BatchQueueConfig,

    #[serde(default)]
    pub collaborators: CollaboratorsConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_dispatcher_config() -> impl Strategy<Value = DispatcherConfig> {
        (any::<bool>(), 1u64..3600, 1usize..64, 1u64..86_400, 0u32..10).prop_map(
            |(enabled, poll_interval_secs, max_concurrent_jobs, job_timeout_secs, ticks)| {
                DispatcherConfig {
                    enabled,
                    poll_interval_secs,
                    max_concurrent_jobs,
                    job_timeout_secs,
                    shutdown_grace_ticks: ticks,
                }
            },
        )
    }

    fn arb_batch_queue_config() -> impl Strategy<Value = BatchQueueConfig> {
        (
            any::<bool>(),
            1usize..16,
            1u64..600,
            1usize..1000,
            1u64..10_000,
            10_000u64..600_000,
            1u32..20,
        )
            .prop_map(
                |(enabled, concurrency, poll, max_items, base, cap, retries)| BatchQueueConfig {
                    enabled,
                    concurrency,
                    poll_interval_secs: poll,
                    max_batch_items: max_items,
                    retry_base_delay_ms: base,
                    retry_max_delay_ms: cap,
                    max_retries: retries,
                },
            )
    }

    fn arb_settings() -> impl Strategy<Value = Settings> {
        (
            "[a-z][a-z0-9-]{0,15}",
            1u16..=65535,
            "postgres://[a-z]{1,8}/[a-z]{1,8}",
            prop::sample::select(vec!["trace", "debug", "info", "warn", "error"]),
            arb_dispatcher_config(),
            arb_batch_queue_config(),
        )
            .prop_map(|(name, port, url, level, dispatcher, batch_queue)| Settings {
                application: ApplicationConfig {
                    name,
                    version: "1.0.0".to_string(),
                },
                server: ServerConfig {
                    port,
                    ..Default::default()
                },
                database: DatabaseConfig {
                    url,
                    ..Default::default()
                },
                logger: LoggerSettings {
                    level: level.to_string(),
                    ..Default::default()
                },
                dispatcher,
                scheduler: SchedulerConfig::default(),
                batch_queue,
                collaborators: CollaboratorsConfig::default(),
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Serializing settings to TOML and reading them back is lossless.
        #[test]
        fn prop_settings_round_trip_serialization(settings in arb_settings()) {
            let toml_str = toml::to_string(&settings).expect("Settings should serialize to TOML");
            let deserialized: Settings = toml::from_str(&toml_str)
                .expect("TOML should deserialize back to Settings");
            prop_assert_eq!(settings, deserialized);
        }
    }

    #[test]
    fn test_application_config_defaults() {
        let config = ApplicationConfig::default();
        assert_eq!(config.name, "beacon-rs");
        assert_eq!(config.version, crate::pkg_version());
    }

    #[test]
    fn test_server_config_address() {
        let config = ServerConfig::default();
        assert_eq!(config.address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_dispatcher_config_defaults() {
        let config = DispatcherConfig::default();
        assert!(config.enabled);
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.max_concurrent_jobs, 5);
        assert_eq!(config.job_timeout(), Duration::from_secs(300));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(90));
    }

    #[test]
    fn test_batch_queue_config_defaults() {
        let config = BatchQueueConfig::default();
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_base_delay_ms, 1_000);
        assert_eq!(config.max_batch_items, 100);
    }

    #[test]
    fn test_file_settings_into_file_config() {
        let settings = FileSettings {
            enabled: true,
            format: "compact".to_string(),
            ..Default::default()
        };
        let config = settings.into_file_config().unwrap();
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.rotation.max_size, 10 * 1024 * 1024);
    }

    #[test]
    fn test_file_settings_invalid_format() {
        let settings = FileSettings {
            format: "xml".to_string(),
            ..Default::default()
        };
        let err = settings.into_file_config().unwrap_err();
        assert!(
            matches!(err, ConfigError::ValidationError { field, .. } if field == "logger.file.format")
        );
    }

    #[test]
    fn test_settings_deserialize_partial() {
        let toml_str = r#"
            [dispatcher]
            max_concurrent_jobs = 8

            [batch_queue]
            concurrency = 2
        "#;

        let settings: Settings = toml::from_str(toml_str).expect("Failed to deserialize");
        assert_eq!(settings.dispatcher.max_concurrent_jobs, 8);
        assert_eq!(settings.dispatcher.poll_interval_secs, 30);
        assert_eq!(settings.batch_queue.concurrency, 2);
        assert_eq!(settings.scheduler.cron, "0 */15 * * * *");
    }

    #[test]
    fn test_shipped_default_toml_matches_code_defaults() {
        let shipped: Settings = toml::from_str(include_str!("../../config/default.toml"))
            .expect("config/default.toml should deserialize");
        assert_eq!(shipped, Settings::default());
    }
}
