//! Typed per-job-type configuration and results.
//!
//! Stored as JSON in `jobs.config` / `jobs.results`; decoded by `job_type`
//! whenever a row crosses the store boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::external::Sentiment;
use crate::models::{JobType, Platform};

fn default_window() -> u32 {
    7
}

fn default_max_recommendations() -> u32 {
    5
}

/// Queries and platforms default to the entity's own lists when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct BrandScanConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "queries cannot be empty when given"))]
    pub queries: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "platforms cannot be empty when given"))]
    pub platforms: Option<Vec<Platform>>,
}

/// Number of recent brand scans compared when computing a trend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TrendAnalysisConfig {
    #[serde(default = "default_window")]
    #[validate(range(min = 1, max = 30, message = "window must be between 1 and 30"))]
    pub window: u32,
}

impl Default for TrendAnalysisConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RecommendationSyncConfig {
    #[serde(default = "default_max_recommendations")]
    #[validate(range(
        min = 1,
        max = 50,
        message = "max_recommendations must be between 1 and 50"
    ))]
    pub max_recommendations: u32,
}

impl Default for RecommendationSyncConfig {
    fn default() -> Self {
        Self {
            max_recommendations: default_max_recommendations(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum JobConfig {
    BrandScan(BrandScanConfig),
    TrendAnalysis(TrendAnalysisConfig),
    RecommendationSync(RecommendationSyncConfig),
}

fn decode_as<T>(value: &JsonValue) -> Result<T, AppError>
where
    T: for<'de> Deserialize<'de> + Default + Validate,
{
    let parsed: T = match value {
        JsonValue::Null => T::default(),
        other => serde_json::from_value(other.clone())
            .map_err(|e| AppError::validation("config", e.to_string()))?,
    };
    parsed.validate()?;
    Ok(parsed)
}

impl JobConfig {
    pub fn default_for(job_type: JobType) -> Self {
        match job_type {
            JobType::BrandScan => JobConfig::BrandScan(BrandScanConfig::default()),
            JobType::TrendAnalysis => JobConfig::TrendAnalysis(TrendAnalysisConfig::default()),
            JobType::RecommendationSync => {
                JobConfig::RecommendationSync(RecommendationSyncConfig::default())
            }
        }
    }

    /// Decode and validate a JSON config for `job_type`. `null` means defaults.
    pub fn decode(job_type: JobType, value: &JsonValue) -> Result<Self, AppError> {
        Ok(match job_type {
            JobType::BrandScan => JobConfig::BrandScan(decode_as(value)?),
            JobType::TrendAnalysis => JobConfig::TrendAnalysis(decode_as(value)?),
            JobType::RecommendationSync => JobConfig::RecommendationSync(decode_as(value)?),
        })
    }

    pub fn job_type(&self) -> JobType {
        match self {
            JobConfig::BrandScan(_) => JobType::BrandScan,
            JobConfig::TrendAnalysis(_) => JobType::TrendAnalysis,
            JobConfig::RecommendationSync(_) => JobType::RecommendationSync,
        }
    }

    pub fn to_value(&self) -> JsonValue {
        // Plain structs of strings and integers always serialize.
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentBreakdown {
    pub positive: u32,
    pub neutral: u32,
    pub negative: u32,
}

impl SentimentBreakdown {
    pub fn record(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Neutral => self.neutral += 1,
            Sentiment::Negative => self.negative += 1,
        }
    }
}

/// One query/platform combination in which the brand was mentioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionRecord {
    pub platform: Platform,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranking_position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrandScanResults {
    pub combinations_checked: u32,
    pub mentions_found: u32,
    /// Percentage of successful combinations that mentioned the brand
    pub mention_rate: f64,
    #[serde(default)]
    pub average_ranking_position: Option<f64>,
    #[serde(default)]
    pub sentiment: SentimentBreakdown,
    #[serde(default)]
    pub mentions: Vec<MentionRecord>,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
    #[default]
    InsufficientData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysisResults {
    pub samples: u32,
    #[serde(default)]
    pub current_mention_rate: Option<f64>,
    #[serde(default)]
    pub previous_mention_rate: Option<f64>,
    #[serde(default)]
    pub delta: Option<f64>,
    #[serde(default)]
    pub direction: TrendDirection,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: RecommendationPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSyncResults {
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub source_job_id: Option<Uuid>,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobResults {
    BrandScan(BrandScanResults),
    TrendAnalysis(TrendAnalysisResults),
    RecommendationSync(RecommendationSyncResults),
}

impl JobResults {
    pub fn decode(job_type: JobType, value: &JsonValue) -> Result<Self, AppError> {
        fn parse<T: for<'de> Deserialize<'de>>(value: &JsonValue) -> Result<T, AppError> {
            serde_json::from_value(value.clone()).map_err(AppError::from)
        }

        Ok(match job_type {
            JobType::BrandScan => JobResults::BrandScan(parse(value)?),
            JobType::TrendAnalysis => JobResults::TrendAnalysis(parse(value)?),
            JobType::RecommendationSync => JobResults::RecommendationSync(parse(value)?),
        })
    }

    pub fn job_type(&self) -> JobType {
        match self {
            JobResults::BrandScan(_) => JobType::BrandScan,
            JobResults::TrendAnalysis(_) => JobType::TrendAnalysis,
            JobResults::RecommendationSync(_) => JobType::RecommendationSync,
        }
    }

    /// Non-fatal sub-errors collected while the job ran.
    pub fn errors(&self) -> &[String] {
        match self {
            JobResults::BrandScan(r) => &r.errors,
            JobResults::TrendAnalysis(r) => &r.errors,
            JobResults::RecommendationSync(r) => &r.errors,
        }
    }

    pub fn to_value(&self) -> Result<JsonValue, AppError> {
        serde_json::to_value(self).map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_config_decodes_to_defaults() {
        let config = JobConfig::decode(JobType::TrendAnalysis, &JsonValue::Null).unwrap();
        assert_eq!(config, JobConfig::TrendAnalysis(TrendAnalysisConfig { window: 7 }));
    }

    #[test]
    fn test_brand_scan_config_with_platforms() {
        let config = JobConfig::decode(
            JobType::BrandScan,
            &json!({"queries": ["best crm"], "platforms": ["claude", "gemini"]}),
        )
        .unwrap();
        match config {
            JobConfig::BrandScan(c) => {
                assert_eq!(c.platforms, Some(vec![Platform::Claude, Platform::Gemini]));
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_config_is_rejected() {
        let err =
            JobConfig::decode(JobType::RecommendationSync, &json!({"max_recommendations": 80}))
                .unwrap_err();
        assert!(matches!(err, AppError::ValidationErrors { .. }));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = JobConfig::decode(JobType::TrendAnalysis, &json!({"windw": 3})).unwrap_err();
        assert!(matches!(err, AppError::Validation { field, .. } if field == "config"));
    }

    #[test]
    fn test_results_decode_and_errors() {
        let results = JobResults::BrandScan(BrandScanResults {
            combinations_checked: 4,
            mentions_found: 2,
            mention_rate: 66.7,
            errors: vec!["claude/best crm: timeout".to_string()],
            ..Default::default()
        });
        let value = results.to_value().unwrap();
        let decoded = JobResults::decode(JobType::BrandScan, &value).unwrap();
        assert_eq!(decoded.errors().len(), 1);
        assert_eq!(decoded.job_type(), JobType::BrandScan);
    }

    #[test]
    fn test_config_value_omits_absent_options() {
        let value = JobConfig::default_for(JobType::BrandScan).to_value();
        assert_eq!(value, json!({}));
    }
}
