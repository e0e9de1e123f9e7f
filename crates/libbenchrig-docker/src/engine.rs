//! Container control plane contract

use std::fs::File;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::DockerError;

/// Live state of one container as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerState {
    pub name: String,
    pub running: bool,
    pub dead: bool,
    /// Health check status, `None` when the container has no health check
    pub health: Option<String>,
}

/// Where a container stands on its way to being usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Health check reports healthy
    Healthy,
    /// No health check configured, but the container is running
    Running,
    /// The container died, it will not become ready
    Dead,
    /// Not ready yet, check again later
    Waiting,
}

impl ContainerState {
    pub fn readiness(&self) -> Readiness {
        match &self.health {
            _ if self.dead => Readiness::Dead,
            Some(status) if status.eq_ignore_ascii_case("healthy") => Readiness::Healthy,
            None if self.running => Readiness::Running,
            _ => Readiness::Waiting,
        }
    }

    /// Health status for log output
    pub fn status(&self) -> &str {
        match &self.health {
            Some(status) => status,
            None if self.running => "running",
            None => "starting",
        }
    }
}

/// Operations the run engine needs from a container engine
///
/// All calls may be made from background tasks.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Bring the services of the compose files up, writing their combined
    /// output to `log`. Returns when the services stop or `cancel` fires.
    async fn compose_up(
        &self,
        files: &[PathBuf],
        log: File,
        cancel: CancellationToken,
    ) -> Result<(), DockerError>;

    /// Stop and remove the services of the compose files
    async fn compose_down(&self, files: &[PathBuf]) -> Result<(), DockerError>;

    /// List the containers of the compose files (ids only when `quiet`)
    async fn compose_ps(&self, files: &[PathBuf], quiet: bool) -> Result<Vec<String>, DockerError>;

    /// Inspect the live state of one container
    async fn container_inspect(&self, id: &str) -> Result<ContainerState, DockerError>;
}
