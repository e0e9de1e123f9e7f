//! Sequential execution of every run of a configuration

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use libbenchrig_core::{build_test_runs, BuildOptions, Config};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::RunEngine;
use crate::error::RunError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// Outcome of one executed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub test: String,
    pub tool: String,
    pub out_path: PathBuf,
    pub started_at: DateTime<Local>,
    pub elapsed: Duration,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reports of every executed run, plus the error that stopped the batch
#[derive(Debug)]
pub struct BatchReport {
    pub runs: Vec<RunReport>,
    /// Total number of runs the configuration expanded to
    pub planned: usize,
    pub error: Option<RunError>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Vec<RunReport>, RunError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.runs),
        }
    }
}

/// Expand `config` and execute each run in turn, stopping at the first
/// failure. Runs after a failure are not attempted.
pub async fn run_all(
    engine: &RunEngine,
    config: &Config,
    options: &BuildOptions,
    cancel: &CancellationToken,
) -> BatchReport {
    let mut report = BatchReport {
        runs: Vec::new(),
        planned: 0,
        error: None,
    };

    if let Err(source) = fs::create_dir_all(&options.out_path) {
        report.error = Some(RunError::CreateOutput {
            path: options.out_path.clone(),
            source,
        });
        return report;
    }

    let runs = build_test_runs(config, options);
    report.planned = runs.len();
    info!(count = runs.len(), "Running tests");

    for (index, run) in runs.iter().enumerate() {
        info!(
            run = index + 1,
            of = runs.len(),
            test = %run.name,
            tool = %run.tool,
            "Starting run"
        );
        let started_at = Local::now();
        let clock = Instant::now();
        let result = engine.execute(run, cancel).await;

        let (status, error) = match &result {
            Ok(()) => (RunStatus::Passed, None),
            Err(e) if e.is_cancelled() => (RunStatus::Cancelled, Some(e.to_string())),
            Err(e) => (RunStatus::Failed, Some(e.to_string())),
        };
        report.runs.push(RunReport {
            test: run.name.clone(),
            tool: run.tool.clone(),
            out_path: run.out_path.clone(),
            started_at,
            elapsed: clock.elapsed(),
            status,
            error,
        });

        if let Err(source) = result {
            error!(run = index + 1, tool = %run.tool, error = %source, "Run failed, stopping");
            report.error = Some(RunError::Run {
                index: index + 1,
                test: run.name.clone(),
                tool: run.tool.clone(),
                source: Box::new(source),
            });
            break;
        }
    }
    report
}
