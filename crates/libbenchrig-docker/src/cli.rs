//! `ContainerEngine` backed by the docker command-line client

use std::fs::File;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::{ContainerEngine, ContainerState};
use crate::error::DockerError;

/// Default docker binary, looked up in `PATH`
pub const DEFAULT_DOCKER_BINARY: &str = "docker";

/// Drives `docker compose` and `docker inspect`
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(DEFAULT_DOCKER_BINARY)
    }
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// `docker compose -f <file>...` with the given subcommand arguments
    fn compose(&self, files: &[PathBuf], args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("compose");
        for file in files {
            cmd.arg("-f").arg(file);
        }
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Run a command to completion and return its stdout
    async fn output(&self, mut cmd: Command) -> Result<String, DockerError> {
        let command = describe(&cmd);
        debug!(command = %command, "Running docker command");

        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(DockerError::CommandFailed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn compose_up(
        &self,
        files: &[PathBuf],
        log: File,
        cancel: CancellationToken,
    ) -> Result<(), DockerError> {
        let mut cmd = self.compose(files, &["up"]);
        let command = describe(&cmd);
        cmd.stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log))
            .kill_on_drop(true);

        debug!(command = %command, "Starting compose services");
        let mut child = cmd.spawn()?;

        let exited = tokio::select! {
            status = child.wait() => Some(status?),
            _ = cancel.cancelled() => None,
        };
        let Some(status) = exited else {
            debug!(command = %command, "Compose up cancelled, killing process");
            child.kill().await?;
            return Ok(());
        };

        if !status.success() {
            return Err(DockerError::CommandFailed {
                command,
                code: status.code(),
                stderr: "see compose log".to_string(),
            });
        }
        Ok(())
    }

    async fn compose_down(&self, files: &[PathBuf]) -> Result<(), DockerError> {
        self.output(self.compose(files, &["down"])).await?;
        Ok(())
    }

    async fn compose_ps(&self, files: &[PathBuf], quiet: bool) -> Result<Vec<String>, DockerError> {
        let args: &[&str] = if quiet { &["ps", "--quiet"] } else { &["ps"] };
        let stdout = self.output(self.compose(files, args)).await?;
        Ok(parse_ps_output(&stdout, quiet))
    }

    async fn container_inspect(&self, id: &str) -> Result<ContainerState, DockerError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["inspect", "--type", "container", id]);
        let stdout = self.output(cmd).await?;
        parse_inspect_output(id, &stdout)
    }
}

fn describe(cmd: &Command) -> String {
    let inner = cmd.as_std();
    std::iter::once(inner.get_program())
        .chain(inner.get_args())
        .map(|s| s.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Container ids in quiet mode, table rows (header skipped) otherwise
fn parse_ps_output(stdout: &str, quiet: bool) -> Vec<String> {
    if quiet {
        stdout.split_whitespace().map(str::to_string).collect()
    } else {
        stdout
            .lines()
            .skip(1)
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectEntry {
    name: String,
    state: InspectState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    #[serde(default)]
    running: bool,
    #[serde(default)]
    dead: bool,
    #[serde(default)]
    health: Option<InspectHealth>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHealth {
    status: String,
}

fn parse_inspect_output(id: &str, stdout: &str) -> Result<ContainerState, DockerError> {
    let entries: Vec<InspectEntry> = serde_json::from_str(stdout)?;
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| DockerError::NotFound(id.to_string()))?;

    Ok(ContainerState {
        name: entry.name.trim_start_matches('/').to_string(),
        running: entry.state.running,
        dead: entry.state.dead,
        health: entry.state.health.map(|h| h.status),
    })
}
