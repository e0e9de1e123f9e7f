//! Collector plugin contract and the samples collectors produce

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libbenchrig_core::Settings;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::MetricsError;

/// A pluggable metrics source sampled during the test window
#[async_trait]
pub trait Collector: Send + Sync {
    /// Stable type identifier used in configuration and registry lookup
    fn type_name(&self) -> &'static str;

    /// Logical instance name
    fn name(&self) -> &str;

    /// Validate and apply settings. Unknown keys are an error.
    fn configure(&mut self, settings: Settings) -> Result<(), MetricsError>;

    /// Sample until `cancel` fires
    async fn run(&self, cancel: CancellationToken) -> Result<(), MetricsError>;

    /// Samples recorded so far, one entry per query
    fn results(&self) -> Vec<QueryResults>;

    fn report(&self) -> CollectorReport {
        CollectorReport {
            name: self.name().to_string(),
            collector: self.type_name().to_string(),
            queries: self.results(),
        }
    }
}

/// One timestamped value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub at: DateTime<Utc>,
    pub value: f64,
}

/// Time series produced by one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResults {
    pub name: String,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub samples: Vec<Sample>,
}

/// Everything a collector recorded during one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorReport {
    pub name: String,
    #[serde(rename = "type")]
    pub collector: String,
    pub queries: Vec<QueryResults>,
}

impl CollectorReport {
    /// Write the report as `<dir>/<name>.json` and return the path
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, MetricsError> {
        let path = dir.join(format!("{}.json", self.name));
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn sample_count(&self) -> usize {
        self.queries.iter().map(|q| q.samples.len()).sum()
    }
}
