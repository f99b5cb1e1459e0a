//! beacon-rs: durable job scheduling and execution.
//!
//! The [`jobs`] module holds the scheduler, the dispatcher and the job
//! handlers; [`batch`] drains content-generation batches; [`api`] and [`cli`]
//! are the two operator surfaces.

use shadow_rs::shadow;
shadow!(build);

pub mod api;
pub mod batch;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod external;
pub mod jobs;
pub mod logger;
pub mod models;
pub mod repositories;
pub mod schema;
pub mod server;
pub mod services;
pub mod state;
pub mod utils;

pub use state::AppState;

pub fn pkg_version() -> &'static str {
    build::PKG_VERSION
}

pub fn clap_long_version() -> &'static str {
    build::CLAP_LONG_VERSION
}
