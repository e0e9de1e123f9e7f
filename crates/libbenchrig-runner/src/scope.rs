//! Per-run cancellation, cleanup and background task state

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cleanup::CleanupStack;
use crate::error::RunError;
use crate::task_group::TaskGroup;

/// Everything a single test run owns while it executes
pub struct RunScope {
    /// Child of the caller's token, cancelled when the caller cancels
    pub cancel: CancellationToken,
    pub cleanup: CleanupStack,
    pub tasks: TaskGroup,
}

impl RunScope {
    pub fn new(parent: &CancellationToken) -> Self {
        let cancel = parent.child_token();
        let tasks = TaskGroup::new(cancel.child_token());
        Self {
            cancel,
            cleanup: CleanupStack::new(),
            tasks,
        }
    }

    /// Sleep unless the run is cancelled first
    pub async fn sleep(&self, duration: Duration) -> Result<(), RunError> {
        sleep_or_cancel(&self.cancel, duration).await
    }

    pub fn check_cancelled(&self) -> Result<(), RunError> {
        if self.cancel.is_cancelled() {
            Err(RunError::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub(crate) async fn sleep_or_cancel(
    cancel: &CancellationToken,
    duration: Duration,
) -> Result<(), RunError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(RunError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
