//! Core library for benchrig
//!
//! This crate provides:
//! - The declarative configuration model and its TOML loader
//! - Lifecycle steps and the hook commands attached to them
//! - Expansion of a configuration into concrete test runs

pub mod builder;
pub mod config;
pub mod error;
pub mod types;

pub use builder::{build_test_runs, BuildOptions};
pub use config::{Config, MetricsCollectorConfig, ServiceConfig, Settings, TestScenario};
pub use error::ConfigError;
pub use types::run::TestRun;
pub use types::step::{Step, TestSteps};
