//! Lifecycle steps of a test run and the hook commands attached to them

use std::fmt;

use serde::{Deserialize, Serialize};

/// One ordered phase of a test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    PreInfrastructure,
    Infrastructure,
    PostInfrastructure,
    PreTool,
    Tool,
    PostTool,
    PreTest,
    Test,
    PostTest,
    PreCleanup,
    Cleanup,
    PostCleanup,
}

impl Step {
    /// Steps walked in order until the first failure
    pub const FORWARD: [Step; 9] = [
        Step::PreInfrastructure,
        Step::Infrastructure,
        Step::PostInfrastructure,
        Step::PreTool,
        Step::Tool,
        Step::PostTool,
        Step::PreTest,
        Step::Test,
        Step::PostTest,
    ];

    /// Steps that always run after the forward walk, whatever its outcome
    pub const CLEANUP: [Step; 3] = [Step::PreCleanup, Step::Cleanup, Step::PostCleanup];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::PreInfrastructure => "pre-infrastructure",
            Step::Infrastructure => "infrastructure",
            Step::PostInfrastructure => "post-infrastructure",
            Step::PreTool => "pre-tool",
            Step::Tool => "tool",
            Step::PostTool => "post-tool",
            Step::PreTest => "pre-test",
            Step::Test => "test",
            Step::PostTest => "post-test",
            Step::PreCleanup => "pre-cleanup",
            Step::Cleanup => "cleanup",
            Step::PostCleanup => "post-cleanup",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shell commands to run at named lifecycle hooks
///
/// `during` runs alongside the timed test window; every other hook runs as
/// the body of the step with the same name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct TestSteps {
    pub pre_infrastructure: Vec<String>,
    pub post_infrastructure: Vec<String>,
    pub pre_tool: Vec<String>,
    pub post_tool: Vec<String>,
    pub pre_test: Vec<String>,
    pub during: Vec<String>,
    pub post_test: Vec<String>,
    pub pre_cleanup: Vec<String>,
    pub post_cleanup: Vec<String>,
}

impl TestSteps {
    /// Commands attached to a step
    ///
    /// Container steps and `cleanup` carry no hooks; `test` maps to `during`.
    pub fn commands(&self, step: Step) -> &[String] {
        match step {
            Step::PreInfrastructure => &self.pre_infrastructure,
            Step::PostInfrastructure => &self.post_infrastructure,
            Step::PreTool => &self.pre_tool,
            Step::PostTool => &self.post_tool,
            Step::PreTest => &self.pre_test,
            Step::Test => &self.during,
            Step::PostTest => &self.post_test,
            Step::PreCleanup => &self.pre_cleanup,
            Step::PostCleanup => &self.post_cleanup,
            Step::Infrastructure | Step::Tool | Step::Cleanup => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        Step::FORWARD
            .iter()
            .chain(Step::CLEANUP.iter())
            .all(|step| self.commands(*step).is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_names_are_kebab_case() {
        let names: Vec<&str> = Step::FORWARD.iter().map(Step::as_str).collect();
        assert_eq!(
            names,
            vec![
                "pre-infrastructure",
                "infrastructure",
                "post-infrastructure",
                "pre-tool",
                "tool",
                "post-tool",
                "pre-test",
                "test",
                "post-test",
            ]
        );
        assert_eq!(Step::PostCleanup.to_string(), "post-cleanup");
    }

    #[test]
    fn test_hook_lookup() {
        let steps = TestSteps {
            pre_test: vec!["echo warmup".to_string()],
            during: vec!["./load.sh".to_string()],
            ..Default::default()
        };

        assert_eq!(steps.commands(Step::PreTest), ["echo warmup".to_string()]);
        assert_eq!(steps.commands(Step::Test), ["./load.sh".to_string()]);
        assert!(steps.commands(Step::Infrastructure).is_empty());
        assert!(!steps.is_empty());
        assert!(TestSteps::default().is_empty());
    }

    #[test]
    fn test_unknown_hook_is_rejected() {
        let result: Result<TestSteps, _> = toml::from_str(r#"pre-tests = ["true"]"#);
        assert!(result.is_err());

        let steps: TestSteps = toml::from_str(r#"post-cleanup = ["rm -rf tmp"]"#).unwrap();
        assert_eq!(steps.post_cleanup, vec!["rm -rf tmp".to_string()]);
    }
}
