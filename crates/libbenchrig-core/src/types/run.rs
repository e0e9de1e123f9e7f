use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::config::{MetricsCollectorConfig, ServiceConfig};
use crate::types::step::TestSteps;

/// One concrete execution of a scenario against one tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestRun {
    /// Scenario name
    pub name: String,
    /// Tool the scenario runs against
    pub tool: String,
    /// Directory holding every artifact of this run
    pub out_path: PathBuf,

    pub infrastructure: Vec<ServiceConfig>,
    pub tools: Vec<ServiceConfig>,
    pub metrics: Vec<MetricsCollectorConfig>,

    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub steps: TestSteps,
}

impl TestRun {
    /// Compose files of the infrastructure services, in start order
    pub fn infrastructure_files(&self) -> Vec<PathBuf> {
        compose_files(&self.infrastructure)
    }

    /// Compose files of the tool services, in start order
    pub fn tool_files(&self) -> Vec<PathBuf> {
        compose_files(&self.tools)
    }
}

fn compose_files(services: &[ServiceConfig]) -> Vec<PathBuf> {
    services.iter().map(|s| s.compose.clone()).collect()
}
