//! Container resource usage from a cAdvisor endpoint

use async_trait::async_trait;
use libbenchrig_core::Settings;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::collector::{Collector, QueryResults};
use crate::error::MetricsError;
use crate::prometheus::{PrometheusCollector, PrometheusConfig, QueryConfig};
use crate::registry::CollectorRegistry;
use crate::specialize::{self, MEGABYTE, RATE_WINDOW, SAMPLE_INTERVAL};

pub const TYPE: &str = "docker";

pub fn register(registry: &mut CollectorRegistry) {
    registry.register(TYPE, |span, name| Box::new(DockerCollector::new(span, name)));
}

/// Prometheus collector preloaded with per-container CPU, memory and network
/// queries. `containers` lists container names as cAdvisor reports them.
pub struct DockerCollector {
    inner: PrometheusCollector,
}

impl DockerCollector {
    pub fn new(parent: Span, name: &str) -> Self {
        Self {
            inner: PrometheusCollector::with_type(parent, name, TYPE),
        }
    }

    pub fn inner(&self) -> &PrometheusCollector {
        &self.inner
    }
}

fn container_queries(container: &str) -> [QueryConfig; 3] {
    let cpu = specialize::selector("container_cpu_usage_seconds_total", "name", container);
    let memory = specialize::selector("container_memory_usage_bytes", "name", container);
    let received =
        specialize::selector("container_network_receive_bytes_total", "name", container);

    [
        QueryConfig::new(
            format!("cpu-percentage[{}]", container),
            format!("rate({}[{}])*100", cpu, RATE_WINDOW),
        )
        .with_unit("%")
        .with_interval(SAMPLE_INTERVAL),
        QueryConfig::new(
            format!("memory-usage[{}]", container),
            format!("{}/{}", memory, MEGABYTE),
        )
        .with_unit("MB")
        .with_interval(SAMPLE_INTERVAL),
        QueryConfig::new(
            format!("network-received[{}]", container),
            format!("rate({}[{}])/{}", received, RATE_WINDOW, MEGABYTE),
        )
        .with_unit("MB/s")
        .with_interval(SAMPLE_INTERVAL),
    ]
}

fn specialized_config(mut settings: Settings) -> Result<PrometheusConfig, MetricsError> {
    let containers: Vec<String> = specialize::take_key(&mut settings, "containers")?;
    let queries = containers.iter().flat_map(|c| container_queries(c)).collect();
    specialize::with_queries(settings, queries)
}

#[async_trait]
impl Collector for DockerCollector {
    fn type_name(&self) -> &'static str {
        TYPE
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn configure(&mut self, settings: Settings) -> Result<(), MetricsError> {
        specialized_config(settings)
            .and_then(|config| self.inner.apply(config))
            .map_err(|e| MetricsError::configure(TYPE, e))
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), MetricsError> {
        self.inner.run(cancel).await
    }

    fn results(&self) -> Vec<QueryResults> {
        self.inner.results()
    }
}
