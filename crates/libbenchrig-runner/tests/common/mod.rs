//! Scripted container engine and fixtures shared by the runner tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use libbenchrig_core::{ServiceConfig, TestRun, TestSteps};
use libbenchrig_docker::{ContainerEngine, ContainerState, DockerError};
use libbenchrig_metrics::CollectorRegistry;
use libbenchrig_runner::{EngineOptions, RunEngine, WaitOptions};
use tokio_util::sync::CancellationToken;

/// Every call the engine received, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Up(PathBuf),
    Down(PathBuf),
    Ps(PathBuf),
    Inspect(String),
}

/// In-memory `ContainerEngine` answering from a script
///
/// `ps` answers by the first compose file. `inspect` walks the state list of
/// a container one call at a time and repeats the last entry.
#[derive(Default)]
pub struct ScriptedEngine {
    containers: HashMap<PathBuf, Vec<String>>,
    states: HashMap<String, Vec<ContainerState>>,
    failing_up: Vec<PathBuf>,
    failing_down: Vec<PathBuf>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_containers(mut self, compose: &str, ids: &[&str]) -> Self {
        self.containers.insert(
            PathBuf::from(compose),
            ids.iter().map(|id| id.to_string()).collect(),
        );
        self
    }

    pub fn with_states(mut self, id: &str, states: Vec<ContainerState>) -> Self {
        self.states.insert(id.to_string(), states);
        self
    }

    pub fn failing_up(mut self, compose: &str) -> Self {
        self.failing_up.push(PathBuf::from(compose));
        self
    }

    pub fn failing_down(mut self, compose: &str) -> Self {
        self.failing_down.push(PathBuf::from(compose));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn downs(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Down(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn ups(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Up(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn inspections(&self, id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Inspect(i) if i == id))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn first(files: &[PathBuf]) -> PathBuf {
    files.first().cloned().unwrap_or_default()
}

fn failed(command: &str) -> DockerError {
    DockerError::CommandFailed {
        command: command.to_string(),
        code: Some(1),
        stderr: "scripted failure".to_string(),
    }
}

#[async_trait]
impl ContainerEngine for ScriptedEngine {
    async fn compose_up(
        &self,
        files: &[PathBuf],
        _log: File,
        cancel: CancellationToken,
    ) -> Result<(), DockerError> {
        let file = first(files);
        self.record(Call::Up(file.clone()));
        if self.failing_up.contains(&file) {
            return Err(failed("compose up"));
        }
        cancel.cancelled().await;
        Ok(())
    }

    async fn compose_down(&self, files: &[PathBuf]) -> Result<(), DockerError> {
        let file = first(files);
        self.record(Call::Down(file.clone()));
        if self.failing_down.contains(&file) {
            return Err(failed("compose down"));
        }
        Ok(())
    }

    async fn compose_ps(&self, files: &[PathBuf], _quiet: bool) -> Result<Vec<String>, DockerError> {
        let file = first(files);
        self.record(Call::Ps(file.clone()));
        if self.failing_up.contains(&file) {
            return Ok(Vec::new());
        }
        Ok(self.containers.get(&file).cloned().unwrap_or_default())
    }

    async fn container_inspect(&self, id: &str) -> Result<ContainerState, DockerError> {
        let seen = self.inspections(id);
        self.record(Call::Inspect(id.to_string()));
        let states = self
            .states
            .get(id)
            .ok_or_else(|| DockerError::NotFound(id.to_string()))?;
        let state = states
            .get(seen)
            .or_else(|| states.last())
            .cloned()
            .ok_or_else(|| DockerError::NotFound(id.to_string()))?;
        Ok(state)
    }
}

pub fn healthy(name: &str) -> ContainerState {
    ContainerState {
        name: name.to_string(),
        running: true,
        dead: false,
        health: Some("healthy".to_string()),
    }
}

pub fn starting(name: &str) -> ContainerState {
    ContainerState {
        name: name.to_string(),
        running: true,
        dead: false,
        health: Some("starting".to_string()),
    }
}

pub fn running(name: &str) -> ContainerState {
    ContainerState {
        name: name.to_string(),
        running: true,
        dead: false,
        health: None,
    }
}

pub fn dead(name: &str) -> ContainerState {
    ContainerState {
        name: name.to_string(),
        running: false,
        dead: true,
        health: None,
    }
}

pub fn service(name: &str, compose: &str) -> ServiceConfig {
    ServiceConfig {
        name: name.to_string(),
        compose: PathBuf::from(compose),
    }
}

/// Run with one infrastructure and one tool service
pub fn test_run(out_path: &Path, duration: Duration) -> TestRun {
    TestRun {
        name: "throughput".to_string(),
        tool: "conduit".to_string(),
        out_path: out_path.to_path_buf(),
        infrastructure: vec![service("kafka", "infra.yml")],
        tools: vec![service("conduit", "tool.yml")],
        metrics: Vec::new(),
        duration,
        steps: TestSteps::default(),
    }
}

/// Engine script where every service comes up healthy
pub fn healthy_engine() -> ScriptedEngine {
    ScriptedEngine::new()
        .with_containers("infra.yml", &["kafka-1"])
        .with_containers("tool.yml", &["conduit-1"])
        .with_states("kafka-1", vec![healthy("kafka-1")])
        .with_states("conduit-1", vec![healthy("conduit-1")])
}

pub fn fast_options() -> EngineOptions {
    EngineOptions {
        wait: WaitOptions {
            poll_interval: Duration::from_millis(5),
            max_list_attempts: 5,
        },
        progress_interval: Duration::from_millis(20),
        drift_buffer: Duration::ZERO,
    }
}

pub fn engine_for(docker: Arc<ScriptedEngine>) -> RunEngine {
    RunEngine::new(docker, Arc::new(CollectorRegistry::with_builtin())).with_options(fast_options())
}
