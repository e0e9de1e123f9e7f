//! Metrics collectors attached to one run

use std::path::{Path, PathBuf};
use std::sync::Arc;

use libbenchrig_core::MetricsCollectorConfig;
use libbenchrig_metrics::{Collector, CollectorRegistry, MetricsError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument, Span};

use crate::error::RunError;

/// Configured collectors of a run
pub struct CollectorSet {
    collectors: Vec<Arc<dyn Collector>>,
}

impl CollectorSet {
    /// Instantiate and configure every collector. Nothing is started.
    pub fn configure(
        registry: &CollectorRegistry,
        configs: &[MetricsCollectorConfig],
    ) -> Result<Self, RunError> {
        let mut collectors = Vec::with_capacity(configs.len());
        for config in configs {
            let mut collector = registry
                .create(&config.collector, Span::current(), &config.name)
                .map_err(|e| RunError::collector(&config.name, e))?;
            collector
                .configure(config.settings.clone())
                .map_err(|e| RunError::collector(&config.name, e))?;
            collectors.push(Arc::from(collector));
        }
        Ok(Self { collectors })
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    /// Start every collector under `cancel`
    pub fn start(&self, cancel: CancellationToken) -> RunningCollectors {
        let mut tasks = JoinSet::new();
        for collector in &self.collectors {
            let collector = collector.clone();
            let token = cancel.clone();
            tasks.spawn(
                async move {
                    let result = collector.run(token).await;
                    (collector.name().to_string(), result)
                }
                .instrument(Span::current()),
            );
        }
        info!(count = self.collectors.len(), "Collectors started");
        RunningCollectors { tasks, cancel }
    }

    /// Write one `<name>.json` per collector into `dir`
    pub fn export(&self, dir: &Path) -> Result<Vec<PathBuf>, RunError> {
        let mut written = Vec::with_capacity(self.collectors.len());
        for collector in &self.collectors {
            let report = collector.report();
            let path = report
                .write_to(dir)
                .map_err(|e| RunError::collector(collector.name(), e))?;
            info!(
                collector = collector.name(),
                samples = report.sample_count(),
                path = %path.display(),
                "Exported metrics"
            );
            written.push(path);
        }
        Ok(written)
    }
}

/// Handle on started collectors
pub struct RunningCollectors {
    tasks: JoinSet<(String, Result<(), MetricsError>)>,
    cancel: CancellationToken,
}

impl RunningCollectors {
    /// Cancel the collectors and wait for them to return. Collector failures
    /// are logged, they never fail the run.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((name, Err(e))) => warn!(collector = %name, error = %e, "Collector failed"),
                Err(e) => warn!(error = %e, "Collector task failed"),
            }
        }
        info!("Collectors stopped");
    }
}
