//! Collaborators the engine calls but does not own.
//!
//! [`PlatformQuery`] asks an LLM platform whether a brand is mentioned for a
//! query; [`ContentGenerator`] produces one piece of content for a batch item.
//! Both ship with reqwest-backed HTTP adapters.

pub mod client;
pub mod content;
pub mod platform;

pub use content::{ContentGenerator, GeneratedContent, HttpContentGenerator};
pub use platform::{HttpPlatformClient, MentionResult, PlatformQuery, Sentiment};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{0}")]
    Other(String),
}
