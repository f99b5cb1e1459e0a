//! Monitored entities (brands) referenced by recurring jobs.

use std::str::FromStr;

use diesel::prelude::*;
use jiff::SignedDuration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// LLM platforms a brand scan can query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Chatgpt,
    Claude,
    Gemini,
    Perplexity,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Chatgpt,
        Platform::Claude,
        Platform::Gemini,
        Platform::Perplexity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Chatgpt => "chatgpt",
            Platform::Claude => "claude",
            Platform::Gemini => "gemini",
            Platform::Perplexity => "perplexity",
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown platform '{}'", s))
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How often recurring jobs run for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoringFrequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl MonitoringFrequency {
    /// Parse the stored free-form value. Anything unrecognized runs daily.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "hourly" => MonitoringFrequency::Hourly,
            "weekly" => MonitoringFrequency::Weekly,
            "monthly" => MonitoringFrequency::Monthly,
            _ => MonitoringFrequency::Daily,
        }
    }

    /// Monthly is a fixed 30 days.
    pub fn interval(&self) -> SignedDuration {
        let millis = match self {
            MonitoringFrequency::Hourly => 3_600_000,
            MonitoringFrequency::Daily => 86_400_000,
            MonitoringFrequency::Weekly => 604_800_000,
            MonitoringFrequency::Monthly => 2_592_000_000,
        };
        SignedDuration::from_millis(millis)
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::monitored_entities)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MonitoredEntityRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub monitoring_frequency: String,
    pub tracking_queries: Vec<String>,
    pub platforms: Vec<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoredEntity {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub monitoring_frequency: String,
    pub tracking_queries: Vec<String>,
    pub platforms: Vec<Platform>,
    pub active: bool,
}

impl MonitoredEntity {
    pub fn frequency(&self) -> MonitoringFrequency {
        MonitoringFrequency::parse_lenient(&self.monitoring_frequency)
    }
}

impl From<MonitoredEntityRow> for MonitoredEntity {
    fn from(row: MonitoredEntityRow) -> Self {
        let platforms = row
            .platforms
            .iter()
            .filter_map(|p| match p.parse::<Platform>() {
                Ok(platform) => Some(platform),
                Err(e) => {
                    tracing::warn!(entity_id = %row.id, error = %e, "Skipping unknown platform");
                    None
                }
            })
            .collect();

        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            monitoring_frequency: row.monitoring_frequency,
            tracking_queries: row.tracking_queries,
            platforms,
            active: row.active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_intervals() {
        assert_eq!(
            MonitoringFrequency::parse_lenient("hourly").interval(),
            SignedDuration::from_hours(1)
        );
        assert_eq!(
            MonitoringFrequency::parse_lenient("Weekly").interval(),
            SignedDuration::from_hours(24 * 7)
        );
        assert_eq!(
            MonitoringFrequency::parse_lenient("monthly").interval(),
            SignedDuration::from_hours(24 * 30)
        );
    }

    #[test]
    fn test_unknown_frequency_is_daily() {
        assert_eq!(
            MonitoringFrequency::parse_lenient("fortnightly"),
            MonitoringFrequency::Daily
        );
        assert_eq!(MonitoringFrequency::parse_lenient(""), MonitoringFrequency::Daily);
    }

    #[test]
    fn test_row_conversion_skips_unknown_platforms() {
        let row = MonitoredEntityRow {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Acme".to_string(),
            monitoring_frequency: "daily".to_string(),
            tracking_queries: vec!["best crm".to_string()],
            platforms: vec!["ChatGPT".to_string(), "bing".to_string()],
            active: true,
        };
        let entity = MonitoredEntity::from(row);
        assert_eq!(entity.platforms, vec![Platform::Chatgpt]);
    }
}
