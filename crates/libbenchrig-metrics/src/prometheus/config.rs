//! Settings accepted by the prometheus collector

use std::time::Duration;

use libbenchrig_core::Settings;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::query::Query;
use crate::error::MetricsError;

pub const DEFAULT_SCRAPE_INTERVAL: Duration = Duration::from_secs(1);

fn default_scrape_interval() -> Duration {
    DEFAULT_SCRAPE_INTERVAL
}

/// Decoded `settings` table of a prometheus collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PrometheusConfig {
    pub url: String,
    #[serde(default = "default_scrape_interval", with = "humantime_serde")]
    pub scrape_interval: Duration,
    #[serde(default)]
    pub queries: Vec<QueryConfig>,
}

/// One named query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    pub name: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Minimum time between two samples, defaults to the scrape interval
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,
}

impl QueryConfig {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            unit: None,
            interval: None,
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

/// A query ready to be evaluated
#[derive(Debug, Clone)]
pub(crate) struct CompiledQuery {
    pub config: QueryConfig,
    pub expr: Query,
    pub interval: Duration,
}

impl PrometheusConfig {
    /// Strictly decode settings and validate every field
    pub fn from_settings(settings: Settings) -> Result<Self, MetricsError> {
        let config: PrometheusConfig = serde_json::from_value(settings.into())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parsed_url(&self) -> Result<Url, MetricsError> {
        Url::parse(&self.url).map_err(|e| MetricsError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }

    fn validate(&self) -> Result<(), MetricsError> {
        self.parsed_url()?;
        if self.scrape_interval.is_zero() {
            return Err(MetricsError::InvalidSetting {
                key: "scrape-interval".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        for query in &self.queries {
            if query.name.is_empty() {
                return Err(MetricsError::InvalidSetting {
                    key: "queries".to_string(),
                    reason: format!("query {:?} has an empty name", query.query),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn compile(&self) -> Result<Vec<CompiledQuery>, MetricsError> {
        self.queries
            .iter()
            .map(|q| {
                Ok(CompiledQuery {
                    expr: Query::parse(&q.query)?,
                    interval: q.interval.unwrap_or(self.scrape_interval),
                    config: q.clone(),
                })
            })
            .collect()
    }
}
