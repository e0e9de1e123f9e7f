//! Benchmark configuration model and TOML loader

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::step::TestSteps;

/// Free-form settings handed to a metrics collector
pub type Settings = serde_json::Map<String, serde_json::Value>;

/// Top-level benchmark configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Infrastructure started for every test
    pub infrastructure: Vec<ServiceConfig>,
    /// Tools under test; each test runs once per tool
    pub tools: Vec<ServiceConfig>,
    /// Collectors sampled during every test
    pub metrics: Vec<MetricsCollectorConfig>,
    /// Named test scenarios
    pub tests: Vec<TestScenario>,
}

/// A service started from a compose file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub name: String,
    /// Path to the compose file, resolved against the config file directory
    pub compose: PathBuf,
}

/// A metrics collector instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsCollectorConfig {
    /// Logical name, also used for the artifact file name
    pub name: String,
    /// Collector type as registered in the collector registry
    #[serde(rename = "type")]
    pub collector: String,
    /// Settings passed unmodified to the collector
    #[serde(default)]
    pub settings: Settings,
}

/// A named, timed benchmark scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestScenario {
    pub name: String,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    #[serde(default)]
    pub steps: TestSteps,
    #[serde(default)]
    pub infrastructure: Vec<ServiceConfig>,
    #[serde(default)]
    pub tools: Vec<ServiceConfig>,
    #[serde(default)]
    pub metrics: Vec<MetricsCollectorConfig>,
}

impl Config {
    /// Load and validate a configuration file
    ///
    /// Relative compose paths are resolved against the directory containing
    /// the file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_toml_str(&contents)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration without resolving paths or validating
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Make every relative compose path absolute against `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |services: &mut Vec<ServiceConfig>| {
            for service in services.iter_mut() {
                if service.compose.is_relative() {
                    service.compose = base.join(&service.compose);
                }
            }
        };

        resolve(&mut self.infrastructure);
        resolve(&mut self.tools);
        for test in &mut self.tests {
            resolve(&mut test.infrastructure);
            resolve(&mut test.tools);
        }
    }

    /// Check names used in output paths and artifact files
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tests.is_empty() {
            return Err(ConfigError::invalid("no tests defined"));
        }

        check_names("tool", self.tools.iter().map(|t| t.name.as_str()))?;
        check_names("infrastructure", self.infrastructure.iter().map(|s| s.name.as_str()))?;
        check_names("test", self.tests.iter().map(|t| t.name.as_str()))?;

        for test in &self.tests {
            check_names("tool", test.tools.iter().map(|t| t.name.as_str()))?;
            check_names(
                "metrics collector",
                self.metrics.iter().chain(test.metrics.iter()).map(|m| m.name.as_str()),
            )?;
            for service in self
                .infrastructure
                .iter()
                .chain(&self.tools)
                .chain(&test.infrastructure)
                .chain(&test.tools)
            {
                if service.compose.as_os_str().is_empty() {
                    return Err(ConfigError::invalid(format!(
                        "service '{}' in test '{}' has no compose file",
                        service.name, test.name
                    )));
                }
            }
        }

        for metric in &self.metrics {
            if metric.collector.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "metrics collector '{}' has no type",
                    metric.name
                )));
            }
        }

        Ok(())
    }
}

/// Names end up in directory and file names, so they must be non-empty,
/// unique within their list and free of path separators
fn check_names<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(ConfigError::invalid(format!("{} name must not be empty", kind)));
        }
        if name.contains(['/', '\\']) {
            return Err(ConfigError::invalid(format!(
                "{} name '{}' must not contain path separators",
                kind, name
            )));
        }
        if !seen.insert(name) {
            return Err(ConfigError::Duplicate {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}
