use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::external::client::check_status;
use crate::external::ExternalError;
use crate::models::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Outcome of asking one platform one query about one brand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionResult {
    pub mentioned: bool,
    #[serde(default)]
    pub ranking_position: Option<u32>,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// Queries an LLM platform for brand mentions. Failures are transient and
/// per query; callers record them and carry on.
#[async_trait]
pub trait PlatformQuery: Send + Sync {
    async fn query_platform(
        &self,
        platform: Platform,
        query: &str,
        entity_name: &str,
    ) -> Result<MentionResult, ExternalError>;
}

#[derive(Serialize)]
struct PlatformQueryRequest<'a> {
    platform: Platform,
    query: &'a str,
    entity_name: &'a str,
}

/// POSTs `{platform, query, entity_name}` to the platform-query service.
#[derive(Clone)]
pub struct HttpPlatformClient {
    client: reqwest::Client,
    url: String,
}

impl HttpPlatformClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl PlatformQuery for HttpPlatformClient {
    async fn query_platform(
        &self,
        platform: Platform,
        query: &str,
        entity_name: &str,
    ) -> Result<MentionResult, ExternalError> {
        let response = self
            .client
            .post(&self.url)
            .json(&PlatformQueryRequest {
                platform,
                query,
                entity_name,
            })
            .send()
            .await?;

        let result = check_status("platform-query", response)
            .await?
            .json::<MentionResult>()
            .await?;
        Ok(result)
    }
}
