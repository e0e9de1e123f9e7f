//! Background tasks owned by one run

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{warn, Instrument, Span};

use crate::error::{panic_message, RunError};

/// Structured group of background tasks
///
/// The first task to fail marks the group dead and cancels the group token,
/// which every task receives. The dead flag is never cleared.
pub struct TaskGroup {
    tasks: JoinSet<Result<(), RunError>>,
    cancel: CancellationToken,
    dead: Arc<AtomicBool>,
}

impl TaskGroup {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel,
            dead: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn a task in the current span. `task` receives the group token.
    pub fn spawn<F, Fut>(&mut self, label: &str, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), RunError>> + Send + 'static,
    {
        let label = label.to_string();
        let cancel = self.cancel.clone();
        let dead = self.dead.clone();
        let fut = task(cancel.clone());

        self.tasks.spawn(
            async move {
                let result = AssertUnwindSafe(fut)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(RunError::Task {
                            task: label.clone(),
                            message: panic_message(panic.as_ref()),
                        })
                    });
                if let Err(e) = &result {
                    warn!(task = %label, error = %e, "Background task failed");
                    dead.store(true, Ordering::SeqCst);
                    cancel.cancel();
                }
                result
            }
            .instrument(Span::current()),
        );
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task and return the first failure
    pub async fn wait(&mut self) -> Result<(), RunError> {
        let mut first = None;
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = flatten(joined) {
                self.dead.store(true, Ordering::SeqCst);
                self.cancel.cancel();
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Cancel every task and wait for them to finish
    pub async fn shutdown(&mut self) -> Result<(), RunError> {
        self.cancel.cancel();
        self.wait().await
    }
}

fn flatten(joined: Result<Result<(), RunError>, JoinError>) -> Result<(), RunError> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(RunError::Task {
            task: "background".to_string(),
            message: e.to_string(),
        }),
    }
}
