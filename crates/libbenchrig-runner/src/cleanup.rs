//! Ordered release of everything a run acquired

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error, info};

use crate::error::RunError;

type ReleaseFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), RunError>> + Send>;

struct CleanupAction {
    label: String,
    release: ReleaseFn,
}

/// Release actions, run newest first
///
/// Actions are pushed right after the resource they release is acquired.
/// Draining runs every action even if earlier ones fail.
#[derive(Default)]
pub struct CleanupStack {
    actions: Vec<CleanupAction>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F, Fut>(&mut self, label: impl Into<String>, release: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), RunError>> + Send + 'static,
    {
        let label = label.into();
        debug!(action = %label, "Registered cleanup action");
        self.actions.push(CleanupAction {
            label,
            release: Box::new(move || release().boxed()),
        });
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Labels in registration order
    pub fn labels(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.label.as_str()).collect()
    }

    /// Run every action in reverse registration order and return all
    /// failures. The stack is empty afterwards.
    pub async fn drain(&mut self) -> Vec<RunError> {
        let mut errors = Vec::new();
        while let Some(action) = self.actions.pop() {
            match (action.release)().await {
                Ok(()) => info!(action = %action.label, "Released"),
                Err(e) => {
                    error!(action = %action.label, error = %e, "Release failed");
                    errors.push(e);
                }
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_drain_is_lifo_and_complete() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut stack = CleanupStack::new();

        for (label, fail) in [("log", false), ("down", true), ("collectors", false)] {
            let order = order.clone();
            stack.push(label, move || async move {
                order.lock().unwrap().push(label);
                if fail {
                    Err(RunError::ContainersFailedToStart)
                } else {
                    Ok(())
                }
            });
        }
        assert_eq!(stack.labels(), vec!["log", "down", "collectors"]);

        let errors = stack.drain().await;
        assert_eq!(*order.lock().unwrap(), vec!["collectors", "down", "log"]);
        assert_eq!(errors.len(), 1);
        assert!(stack.is_empty());

        assert!(stack.drain().await.is_empty());
    }
}
