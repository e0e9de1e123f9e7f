//! Shell commands attached to lifecycle steps

use std::fs::{File, OpenOptions};
use std::process::Stdio;

use libbenchrig_core::{Step, TestRun};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::RunError;

/// Combined output of every hook of a run
pub const HOOKS_LOG: &str = "hooks.log";

pub const ENV_TEST: &str = "BENCHRIG_TEST";
pub const ENV_TOOL: &str = "BENCHRIG_TOOL";
pub const ENV_OUTPUT: &str = "BENCHRIG_OUTPUT";

/// Run the commands of `step` one after another with `sh -c`, in the run's
/// output directory. The first non-zero exit fails the step.
pub async fn run_hooks(
    step: Step,
    run: &TestRun,
    cancel: &CancellationToken,
) -> Result<(), RunError> {
    let commands = run.steps.commands(step);
    if commands.is_empty() {
        return Ok(());
    }

    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(run.out_path.join(HOOKS_LOG))?;

    for command in commands {
        run_hook(step, command, run, &log, cancel).await?;
    }
    Ok(())
}

async fn run_hook(
    step: Step,
    command: &str,
    run: &TestRun,
    log: &File,
    cancel: &CancellationToken,
) -> Result<(), RunError> {
    info!(command, "Running hook");

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(&run.out_path)
        .env(ENV_TEST, &run.name)
        .env(ENV_TOOL, &run.tool)
        .env(ENV_OUTPUT, &run.out_path)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.try_clone()?))
        .stderr(Stdio::from(log.try_clone()?))
        .kill_on_drop(true)
        .spawn()?;

    let exited = tokio::select! {
        status = child.wait() => Some(status?),
        _ = cancel.cancelled() => None,
    };
    let Some(status) = exited else {
        child.kill().await?;
        return Err(RunError::Cancelled);
    };

    if !status.success() {
        return Err(RunError::Hook {
            step,
            command: command.to_string(),
            code: status.code(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use libbenchrig_core::TestSteps;
    use tempfile::tempdir;

    fn run_in(dir: &std::path::Path, steps: TestSteps) -> TestRun {
        TestRun {
            name: "throughput".to_string(),
            tool: "conduit".to_string(),
            out_path: dir.to_path_buf(),
            infrastructure: Vec::new(),
            tools: Vec::new(),
            metrics: Vec::new(),
            duration: Duration::from_secs(1),
            steps,
        }
    }

    #[tokio::test]
    async fn test_hooks_log_output_with_env() {
        let dir = tempdir().unwrap();
        let run = run_in(
            dir.path(),
            TestSteps {
                pre_test: vec![
                    "echo \"$BENCHRIG_TEST/$BENCHRIG_TOOL\"".to_string(),
                    "touch marker".to_string(),
                ],
                ..Default::default()
            },
        );

        run_hooks(Step::PreTest, &run, &CancellationToken::new()).await.unwrap();

        let log = fs::read_to_string(dir.path().join(HOOKS_LOG)).unwrap();
        assert_eq!(log, "throughput/conduit\n");
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_no_hooks_no_log() {
        let dir = tempdir().unwrap();
        let run = run_in(dir.path(), TestSteps::default());

        run_hooks(Step::PostTest, &run, &CancellationToken::new()).await.unwrap();
        assert!(!dir.path().join(HOOKS_LOG).exists());
    }

    #[tokio::test]
    async fn test_failing_hook_stops_sequence() {
        let dir = tempdir().unwrap();
        let run = run_in(
            dir.path(),
            TestSteps {
                post_tool: vec!["exit 4".to_string(), "touch never".to_string()],
                ..Default::default()
            },
        );

        let err = run_hooks(Step::PostTool, &run, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::Hook { step: Step::PostTool, ref command, code: Some(4) } if command == "exit 4"
        ));
        assert!(!dir.path().join("never").exists());
    }

    #[tokio::test]
    async fn test_cancel_kills_hook() {
        let dir = tempdir().unwrap();
        let run = run_in(
            dir.path(),
            TestSteps {
                pre_cleanup: vec!["sleep 30".to_string()],
                ..Default::default()
            },
        );
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.cancel();
        });

        let err = run_hooks(Step::PreCleanup, &run, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
