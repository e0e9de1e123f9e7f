//! Lifecycle state machine of a single test run
//!
//! ```text
//! pre-infrastructure -> infrastructure -> post-infrastructure
//!   -> pre-tool -> tool -> post-tool -> pre-test -> test -> post-test
//!   => pre-cleanup -> cleanup -> post-cleanup   (always, exactly once)
//! ```
//!
//! The forward walk stops at the first failing step. The cleanup triple runs
//! on every exit path, including a panic inside a forward step.

use std::fs;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use libbenchrig_core::{Step, TestRun};
use libbenchrig_docker::ContainerEngine;
use libbenchrig_metrics::CollectorRegistry;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::collectors::{CollectorSet, RunningCollectors};
use crate::compose::{compose_up_and_wait, WaitOptions};
use crate::error::{panic_message, RunError};
use crate::hooks::run_hooks;
use crate::scope::RunScope;

pub const INFRASTRUCTURE_LOG: &str = "infrastructure.log";
pub const TOOLS_LOG: &str = "tools.log";

/// Timing knobs of the engine
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub wait: WaitOptions,
    /// Time between two progress lines during the test window
    pub progress_interval: Duration,
    /// Added to the reported end of the test window
    pub drift_buffer: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            wait: WaitOptions::default(),
            progress_interval: Duration::from_secs(5),
            drift_buffer: Duration::from_millis(500),
        }
    }
}

/// Executes test runs against a container engine
#[derive(Clone)]
pub struct RunEngine {
    docker: Arc<dyn ContainerEngine>,
    registry: Arc<CollectorRegistry>,
    options: EngineOptions,
}

impl RunEngine {
    pub fn new(docker: Arc<dyn ContainerEngine>, registry: Arc<CollectorRegistry>) -> Self {
        Self {
            docker,
            registry,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Execute one run to completion
    ///
    /// Fails without touching any resource if the output directory already
    /// exists or a collector cannot be configured. Otherwise every acquired
    /// resource is released before this returns. A forward failure is
    /// returned as is; cleanup failures become the error only when the
    /// forward walk succeeded.
    pub async fn execute(&self, run: &TestRun, cancel: &CancellationToken) -> Result<(), RunError> {
        let span = info_span!("run", test = %run.name, tool = %run.tool);
        self.execute_inner(run, cancel).instrument(span).await
    }

    async fn execute_inner(&self, run: &TestRun, cancel: &CancellationToken) -> Result<(), RunError> {
        info!(output = %run.out_path.display(), "Running test");

        if run.out_path.exists() {
            return Err(RunError::OutputExists(run.out_path.clone()));
        }
        let collectors = CollectorSet::configure(&self.registry, &run.metrics)?;
        fs::create_dir_all(&run.out_path).map_err(|source| RunError::CreateOutput {
            path: run.out_path.clone(),
            source,
        })?;

        let mut execution = Execution {
            engine: self,
            run,
            scope: RunScope::new(cancel),
            release: CancellationToken::new(),
            collectors,
        };

        let outcome = execution.forward().await;
        let cleanup_errors = execution.cleanup().await;
        if let Err(e) = execution.scope.tasks.shutdown().await {
            warn!(error = %e, "Background task ended with an error");
        }

        match outcome {
            Err(e) => {
                error!(error = %e, "Test stopped because of an error");
                if !cleanup_errors.is_empty() {
                    error!(error = %RunError::Cleanup(cleanup_errors), "Cleanup failed");
                }
                Err(e)
            }
            Ok(()) if cleanup_errors.is_empty() => {
                info!("Test successful");
                Ok(())
            }
            Ok(()) => Err(RunError::Cleanup(cleanup_errors)),
        }
    }
}

/// State of one run while its steps execute
struct Execution<'a> {
    engine: &'a RunEngine,
    run: &'a TestRun,
    scope: RunScope,
    /// Token of the cleanup hooks, never tied to the caller's
    release: CancellationToken,
    collectors: CollectorSet,
}

impl Execution<'_> {
    async fn forward(&mut self) -> Result<(), RunError> {
        for step in Step::FORWARD {
            self.scope.check_cancelled()?;
            self.step(step).await?;
        }
        Ok(())
    }

    /// Run the cleanup triple and collect every failure
    async fn cleanup(&mut self) -> Vec<RunError> {
        let mut errors = Vec::new();
        for step in Step::CLEANUP {
            match self.step(step).await {
                Ok(()) => {}
                Err(RunError::Cleanup(nested)) => errors.extend(nested),
                Err(e) => errors.push(e),
            }
        }
        errors
    }

    async fn step(&mut self, step: Step) -> Result<(), RunError> {
        let span = info_span!("step", step = %step);
        async {
            info!("Running step");
            let result = AssertUnwindSafe(self.dispatch(step))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(RunError::Panicked {
                        step,
                        message: panic_message(panic.as_ref()),
                    })
                });
            match &result {
                Ok(()) => info!("Step successful"),
                Err(e) => error!(error = %e, "Step failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&mut self, step: Step) -> Result<(), RunError> {
        match step {
            Step::Infrastructure => {
                let files = self.run.infrastructure_files();
                self.services(files, INFRASTRUCTURE_LOG).await
            }
            Step::Tool => {
                let files = self.run.tool_files();
                self.services(files, TOOLS_LOG).await
            }
            Step::Test => self.test_window().await,
            Step::PostTest => {
                self.collectors.export(&self.run.out_path)?;
                run_hooks(step, self.run, &self.scope.cancel).await
            }
            Step::Cleanup => {
                let errors = self.scope.cleanup.drain().await;
                if errors.is_empty() {
                    Ok(())
                } else {
                    Err(RunError::Cleanup(errors))
                }
            }
            Step::PreCleanup | Step::PostCleanup => {
                run_hooks(step, self.run, &self.release).await
            }
            _ => run_hooks(step, self.run, &self.scope.cancel).await,
        }
    }

    async fn services(&mut self, files: Vec<PathBuf>, log_name: &str) -> Result<(), RunError> {
        if files.is_empty() {
            info!("No compose files, nothing to start");
            return Ok(());
        }
        compose_up_and_wait(
            self.engine.docker.clone(),
            &mut self.scope,
            files,
            &self.run.out_path.join(log_name),
            &self.engine.options.wait,
        )
        .await
    }

    /// Start collectors and `during` hooks, then hold for the run duration
    async fn test_window(&mut self) -> Result<(), RunError> {
        let running = self.start_collectors();
        let result = hold_window(self.run, &self.engine.options, &self.scope.cancel).await;
        if let Some(running) = running {
            running.stop().await;
        }
        result
    }

    fn start_collectors(&mut self) -> Option<RunningCollectors> {
        if self.collectors.is_empty() {
            return None;
        }
        let token = self.scope.cancel.child_token();
        let stop = token.clone();
        self.scope.cleanup.push("stop collectors", move || async move {
            stop.cancel();
            Ok(())
        });
        Some(self.collectors.start(token))
    }
}

/// Wait out the test window while `during` hooks run alongside it. Hooks
/// still running when the window closes are killed.
async fn hold_window(
    run: &TestRun,
    options: &EngineOptions,
    cancel: &CancellationToken,
) -> Result<(), RunError> {
    let ends_at = Instant::now() + run.duration + options.drift_buffer;

    let completed = tokio::time::sleep(run.duration);
    tokio::pin!(completed);

    let first_tick = Instant::now() + options.progress_interval;
    let mut progress = tokio::time::interval_at(first_tick, options.progress_interval);
    progress.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let during = run_hooks(Step::Test, run, cancel);
    tokio::pin!(during);
    let mut during_done = false;

    info!(time_left = ?time_left(ends_at), "Test in progress");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            _ = &mut completed => break,
            _ = progress.tick() => {
                info!(time_left = ?time_left(ends_at), "Test in progress");
            }
            result = &mut during, if !during_done => {
                during_done = true;
                result?;
            }
        }
    }
    Ok(())
}

/// Whole seconds until `ends_at`
fn time_left(ends_at: Instant) -> Duration {
    Duration::from_secs(ends_at.saturating_duration_since(Instant::now()).as_secs())
}
