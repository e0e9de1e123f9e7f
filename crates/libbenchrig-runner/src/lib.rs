//! Test run execution for benchrig
//!
//! A [`RunEngine`] walks one [`TestRun`](libbenchrig_core::TestRun) through
//! its lifecycle: hooks, infrastructure and tool containers, the timed test
//! window with its collectors, and a cleanup phase that always runs.
//! [`run_all`] drives every run of a configuration in sequence.

pub mod cleanup;
pub mod collectors;
pub mod compose;
pub mod driver;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod scope;
pub mod task_group;

pub use cleanup::CleanupStack;
pub use compose::{compose_up_and_wait, WaitOptions};
pub use driver::{run_all, BatchReport, RunReport, RunStatus};
pub use engine::{EngineOptions, RunEngine};
pub use error::RunError;
pub use scope::RunScope;
pub use task_group::TaskGroup;
