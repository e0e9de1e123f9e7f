//! Bring compose services up and wait until every container is ready

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use libbenchrig_docker::{ContainerEngine, Readiness};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument, Span};

use crate::error::{panic_message, RunError};
use crate::scope::{sleep_or_cancel, RunScope};

/// Polling bounds for compose-up-and-wait
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Delay between two `ps` or `inspect` polls
    pub poll_interval: Duration,
    /// Number of `ps` polls before giving up on containers appearing
    pub max_list_attempts: u32,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_list_attempts: 30,
        }
    }
}

/// Start the services of `files` in the background and wait until all of
/// their containers are ready.
///
/// Registers, in order, flushing the log file and `compose down` on the run's
/// cleanup stack. Both are registered before any waiting so they run even if
/// the wait fails. The log itself is closed when the `compose up` task ends.
pub async fn compose_up_and_wait(
    engine: Arc<dyn ContainerEngine>,
    scope: &mut RunScope,
    files: Vec<PathBuf>,
    log_path: &Path,
    options: &WaitOptions,
) -> Result<(), RunError> {
    let log = File::create(log_path)?;
    let kept = tokio::fs::File::from_std(log.try_clone()?);
    scope.cleanup.push(
        format!("flush {}", log_path.display()),
        move || async move {
            let synced = kept.sync_all().await;
            drop(kept);
            synced.map_err(RunError::from)
        },
    );

    {
        let engine = engine.clone();
        let files = files.clone();
        scope.tasks.spawn("compose up", move |cancel| async move {
            engine
                .compose_up(&files, log, cancel)
                .await
                .map_err(RunError::from)
        });
    }

    {
        let engine = engine.clone();
        let files = files.clone();
        let span = Span::current();
        scope.cleanup.push("compose down", move || {
            async move {
                info!("Stopping containers");
                engine.compose_down(&files).await.map_err(RunError::from)
            }
            .instrument(span)
        });
    }

    info!("Waiting for containers to start");
    let containers = list_containers(engine.as_ref(), scope, &files, options).await?;
    if containers.is_empty() {
        warn!(
            attempts = options.max_list_attempts,
            "No containers listed, nothing to wait for"
        );
    } else {
        info!(count = containers.len(), "Identified containers");
    }

    if scope.tasks.is_dead() {
        return Err(RunError::ContainersFailedToStart);
    }

    wait_until_ready(engine, &scope.cancel, containers, options.poll_interval).await
}

/// Poll `ps` until it lists containers. Running out of attempts yields an
/// empty list; services may all be one-shot jobs that already exited.
async fn list_containers(
    engine: &dyn ContainerEngine,
    scope: &RunScope,
    files: &[PathBuf],
    options: &WaitOptions,
) -> Result<Vec<String>, RunError> {
    for _ in 0..options.max_list_attempts {
        scope.sleep(options.poll_interval).await?;

        let ids = tokio::select! {
            _ = scope.cancel.cancelled() => return Err(RunError::Cancelled),
            ids = engine.compose_ps(files, true) => ids?,
        };
        if !ids.is_empty() {
            return Ok(ids);
        }
        if scope.tasks.is_dead() {
            return Err(RunError::ContainersFailedToStart);
        }
    }
    Ok(Vec::new())
}

/// Poll every container concurrently. The first failure wins and the
/// remaining polls are aborted.
async fn wait_until_ready(
    engine: Arc<dyn ContainerEngine>,
    cancel: &CancellationToken,
    containers: Vec<String>,
    interval: Duration,
) -> Result<(), RunError> {
    let mut polls = JoinSet::new();
    for id in containers {
        let engine = engine.clone();
        let cancel = cancel.clone();
        polls.spawn(
            async move { wait_for_container(engine.as_ref(), &id, &cancel, interval).await }
                .instrument(Span::current()),
        );
    }

    while let Some(joined) = polls.join_next().await {
        match joined {
            Ok(result) => result?,
            Err(e) if e.is_panic() => {
                return Err(RunError::Task {
                    task: "readiness poll".to_string(),
                    message: panic_message(e.into_panic().as_ref()),
                })
            }
            Err(_) => return Err(RunError::Cancelled),
        }
    }
    Ok(())
}

async fn wait_for_container(
    engine: &dyn ContainerEngine,
    id: &str,
    cancel: &CancellationToken,
    interval: Duration,
) -> Result<(), RunError> {
    loop {
        let state = tokio::select! {
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            state = engine.container_inspect(id) => state?,
        };

        match state.readiness() {
            Readiness::Dead => return Err(RunError::ContainerDead(state.name)),
            Readiness::Healthy => {
                info!(container = %state.name, "Container is healthy");
                return Ok(());
            }
            Readiness::Running => {
                warn!(
                    container = %state.name,
                    "Container is running without a health check, consider adding one"
                );
                return Ok(());
            }
            Readiness::Waiting => {
                info!(
                    container = %state.name,
                    status = state.status(),
                    "Waiting for container to become healthy"
                );
            }
        }

        sleep_or_cancel(cancel, interval).await?;
    }
}
