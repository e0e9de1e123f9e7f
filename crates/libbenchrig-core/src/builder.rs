//! Expansion of a configuration into concrete test runs

use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::config::{Config, ServiceConfig};
use crate::types::run::TestRun;

/// Timestamp layout used as the prefix of every run directory
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Options controlling run expansion
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Root directory under which run directories are created
    pub out_path: PathBuf,
    /// Timestamp shared by all runs of one batch
    pub now: DateTime<Local>,
    /// Only expand these tests (empty = all)
    pub tests: Vec<String>,
    /// Only expand these tools (empty = all)
    pub tools: Vec<String>,
}

impl BuildOptions {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            now: Local::now(),
            tests: Vec::new(),
            tools: Vec::new(),
        }
    }

    /// Pin the batch timestamp
    pub fn with_now(mut self, now: DateTime<Local>) -> Self {
        self.now = now;
        self
    }

    pub fn with_tests(mut self, tests: Vec<String>) -> Self {
        self.tests = tests;
        self
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    fn wants_test(&self, name: &str) -> bool {
        self.tests.is_empty() || self.tests.iter().any(|t| t == name)
    }

    fn wants_tool(&self, name: &str) -> bool {
        self.tools.is_empty() || self.tools.iter().any(|t| t == name)
    }
}

/// Build one run per (test, tool) pair
///
/// Tool names are the union of the global tools (declaration order) and the
/// tools only declared by the test (encountered order). Lists are merged
/// global first, without deduplication.
pub fn build_test_runs(config: &Config, opts: &BuildOptions) -> Vec<TestRun> {
    let stamp = opts.now.format(RUN_TIMESTAMP_FORMAT).to_string();
    let mut runs = Vec::with_capacity(config.tests.len() * config.tools.len().max(1));

    for test in config.tests.iter().filter(|t| opts.wants_test(&t.name)) {
        let infrastructure: Vec<ServiceConfig> = config
            .infrastructure
            .iter()
            .chain(test.infrastructure.iter())
            .cloned()
            .collect();

        let metrics = config
            .metrics
            .iter()
            .chain(test.metrics.iter())
            .cloned()
            .collect::<Vec<_>>();

        let mut tool_names: Vec<&str> = config.tools.iter().map(|t| t.name.as_str()).collect();
        for tool in &test.tools {
            if !tool_names.contains(&tool.name.as_str()) {
                tool_names.push(&tool.name);
            }
        }

        for tool in tool_names.into_iter().filter(|t| opts.wants_tool(t)) {
            let tools = config
                .tools
                .iter()
                .filter(|t| t.name == tool)
                .chain(test.tools.iter().filter(|t| t.name == tool))
                .cloned()
                .collect();

            runs.push(TestRun {
                name: test.name.clone(),
                tool: tool.to_string(),
                out_path: opts
                    .out_path
                    .join(format!("{}_{}_{}", stamp, test.name, tool)),
                infrastructure: infrastructure.clone(),
                tools,
                metrics: metrics.clone(),
                duration: test.duration,
                steps: test.steps.clone(),
            });
        }
    }

    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    use crate::config::{MetricsCollectorConfig, Settings, TestScenario};
    use crate::types::step::TestSteps;

    fn service(name: &str, compose: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            compose: PathBuf::from(compose),
        }
    }

    fn collector(name: &str) -> MetricsCollectorConfig {
        MetricsCollectorConfig {
            name: name.to_string(),
            collector: "prometheus".to_string(),
            settings: Settings::new(),
        }
    }

    fn scenario(name: &str) -> TestScenario {
        TestScenario {
            name: name.to_string(),
            duration: Duration::from_secs(60),
            steps: TestSteps::default(),
            infrastructure: Vec::new(),
            tools: Vec::new(),
            metrics: Vec::new(),
        }
    }

    fn options() -> BuildOptions {
        let now = Local.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap();
        BuildOptions::new("/tmp/results").with_now(now)
    }

    #[test]
    fn test_run_count_is_tests_times_tool_union() {
        let mut only_extra = scenario("b");
        only_extra.tools.push(service("extra", "extra.yml"));

        let config = Config {
            tools: vec![service("t1", "t1.yml"), service("t2", "t2.yml")],
            tests: vec![scenario("a"), only_extra, scenario("c")],
            ..Default::default()
        };

        let runs = build_test_runs(&config, &options());

        // a: t1, t2; b: t1, t2, extra; c: t1, t2
        assert_eq!(runs.len(), 7);
        let mut paths: Vec<_> = runs.iter().map(|r| r.out_path.clone()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), runs.len());
    }

    #[test]
    fn test_tool_order_global_first() {
        let mut test = scenario("load");
        test.tools.push(service("zeta", "z.yml"));
        test.tools.push(service("beta", "b-override.yml"));
        test.tools.push(service("alpha", "a.yml"));

        let config = Config {
            tools: vec![service("beta", "b.yml"), service("gamma", "g.yml")],
            tests: vec![test],
            ..Default::default()
        };

        let runs = build_test_runs(&config, &options());
        let tools: Vec<&str> = runs.iter().map(|r| r.tool.as_str()).collect();
        assert_eq!(tools, vec!["beta", "gamma", "zeta", "alpha"]);

        // global config first, then the scenario override
        assert_eq!(
            runs[0].tool_files(),
            vec![PathBuf::from("b.yml"), PathBuf::from("b-override.yml")]
        );
        assert_eq!(runs[1].tool_files(), vec![PathBuf::from("g.yml")]);
        assert_eq!(runs[2].tool_files(), vec![PathBuf::from("z.yml")]);
    }

    #[test]
    fn test_infrastructure_and_metrics_merge_order() {
        let mut test = scenario("load");
        test.infrastructure = vec![service("db", "db-test.yml"), service("cache", "cache.yml")];
        test.metrics = vec![collector("scenario-metrics")];

        let config = Config {
            infrastructure: vec![service("broker", "broker.yml"), service("db", "db.yml")],
            tools: vec![service("tool", "tool.yml")],
            metrics: vec![collector("global-metrics")],
            tests: vec![test],
        };

        let runs = build_test_runs(&config, &options());
        assert_eq!(runs.len(), 1);

        // duplicates are kept, global entries first
        assert_eq!(
            runs[0].infrastructure_files(),
            vec![
                PathBuf::from("broker.yml"),
                PathBuf::from("db.yml"),
                PathBuf::from("db-test.yml"),
                PathBuf::from("cache.yml"),
            ]
        );
        let names: Vec<&str> = runs[0].metrics.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["global-metrics", "scenario-metrics"]);
    }

    #[test]
    fn test_output_path_layout() {
        let config = Config {
            tools: vec![service("conduit", "c.yml")],
            tests: vec![scenario("throughput")],
            ..Default::default()
        };

        let runs = build_test_runs(&config, &options());
        assert_eq!(
            runs[0].out_path,
            PathBuf::from("/tmp/results/20250314150926_throughput_conduit")
        );
        assert_eq!(runs[0].duration, Duration::from_secs(60));
    }

    #[test]
    fn test_filters() {
        let config = Config {
            tools: vec![service("t1", "t1.yml"), service("t2", "t2.yml")],
            tests: vec![scenario("a"), scenario("b")],
            ..Default::default()
        };

        let opts = options()
            .with_tests(vec!["b".to_string()])
            .with_tools(vec!["t2".to_string()]);
        let runs = build_test_runs(&config, &opts);

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].name, "b");
        assert_eq!(runs[0].tool, "t2");
    }

    #[test]
    fn test_no_tools_means_no_runs() {
        let config = Config {
            tests: vec![scenario("a")],
            ..Default::default()
        };
        assert!(build_test_runs(&config, &options()).is_empty());
    }
}
