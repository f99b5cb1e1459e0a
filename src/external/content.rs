use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::external::client::check_status;
use crate::external::ExternalError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedContent {
    /// Reference to the stored article, kept on the batch item
    pub result_ref: String,
}

/// Generates the content for one batch item. A failure fails that item only.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, payload: &JsonValue) -> Result<GeneratedContent, ExternalError>;
}

/// POSTs the item payload as-is to the content-generation service.
#[derive(Clone)]
pub struct HttpContentGenerator {
    client: reqwest::Client,
    url: String,
}

impl HttpContentGenerator {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn generate(&self, payload: &JsonValue) -> Result<GeneratedContent, ExternalError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        let content = check_status("content-generation", response)
            .await?
            .json::<GeneratedContent>()
            .await?;

        if content.result_ref.trim().is_empty() {
            return Err(ExternalError::Other(
                "content-generation returned an empty result_ref".to_string(),
            ));
        }
        Ok(content)
    }
}
