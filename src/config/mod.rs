//! Layered configuration for beacon-rs
//!
//! Sources, lowest priority first:
//! 1. `default.toml`
//! 2. `{environment}.toml`, selected by `BEACON_APP_ENV`
//! 3. `local.toml` (not committed)
//! 4. `BEACON_*` environment variables, `__` separating nested keys
//!
//! `BEACON_CONFIG_FILE` replaces steps 1-3 with a single file.

pub mod environment;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use environment::Environment;
pub use loader::ConfigLoader;
pub use settings::{
    BatchQueueConfig, CollaboratorsConfig, DatabaseConfig, DispatcherConfig, SchedulerConfig,
    ServerConfig, Settings,
};
