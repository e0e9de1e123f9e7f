use std::path::PathBuf;

use libbenchrig_core::{ConfigError, Step};
use libbenchrig_docker::DockerError;
use libbenchrig_metrics::MetricsError;
use thiserror::Error;

/// Errors raised while executing test runs
#[derive(Debug, Error)]
pub enum RunError {
    #[error("output folder {} already exists", .0.display())]
    OutputExists(PathBuf),

    #[error("failed to create output folder {}: {source}", path.display())]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Docker error: {0}")]
    Docker(#[from] DockerError),

    #[error("collector {name}: {source}")]
    Collector {
        name: String,
        #[source]
        source: MetricsError,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error("failed to start containers")]
    ContainersFailedToStart,

    #[error("container {0} is dead")]
    ContainerDead(String),

    #[error("{step} hook `{command}` exited with {}", exit_text(.code))]
    Hook {
        step: Step,
        command: String,
        code: Option<i32>,
    },

    #[error("step {step} panicked: {message}")]
    Panicked { step: Step, message: String },

    #[error("background task {task} failed: {message}")]
    Task { task: String, message: String },

    #[error("cleanup failed: {}", join(.0))]
    Cleanup(Vec<RunError>),

    #[error("run {index} ({test} with {tool}) failed: {source}")]
    Run {
        index: usize,
        test: String,
        tool: String,
        #[source]
        source: Box<RunError>,
    },
}

impl RunError {
    pub fn collector(name: &str, source: MetricsError) -> Self {
        RunError::Collector {
            name: name.to_string(),
            source,
        }
    }

    /// True when the run stopped because its cancellation token fired
    pub fn is_cancelled(&self) -> bool {
        match self {
            RunError::Cancelled => true,
            RunError::Run { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// True for errors raised before any resource was touched because the
    /// benchmark definition is wrong
    pub fn is_configuration(&self) -> bool {
        match self {
            RunError::Config(_) => true,
            RunError::Collector { source, .. } => source.is_configuration(),
            RunError::Run { source, .. } => source.is_configuration(),
            _ => false,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_cancelled() {
            130
        } else if self.is_configuration() {
            2
        } else {
            1
        }
    }
}

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn exit_text(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (killed by signal)".to_string(),
    }
}

fn join(errors: &[RunError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
