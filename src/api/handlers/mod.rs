//! HTTP request handlers, one module per resource.

pub mod batches;
pub mod engine;
pub mod entities;
pub mod health;
pub mod jobs;
