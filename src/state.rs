//! Shared state handed to every admin API handler.

use crate::services::Services;

/// Cloning is cheap; [`Services`] shares everything through `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}
