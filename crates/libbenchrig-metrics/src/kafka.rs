//! Kafka broker throughput per topic

use async_trait::async_trait;
use libbenchrig_core::Settings;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::collector::{Collector, QueryResults};
use crate::error::MetricsError;
use crate::prometheus::{PrometheusCollector, PrometheusConfig, QueryConfig};
use crate::registry::CollectorRegistry;
use crate::specialize::{self, MEGABYTE, RATE_WINDOW, SAMPLE_INTERVAL};

pub const TYPE: &str = "kafka";

pub fn register(registry: &mut CollectorRegistry) {
    registry.register(TYPE, |span, name| Box::new(KafkaCollector::new(span, name)));
}

/// Prometheus collector preloaded with broker topic queries
///
/// Settings are those of the prometheus collector plus `topics`, a list of
/// topic names.
pub struct KafkaCollector {
    inner: PrometheusCollector,
}

impl KafkaCollector {
    pub fn new(parent: Span, name: &str) -> Self {
        Self {
            inner: PrometheusCollector::with_type(parent, name, TYPE),
        }
    }

    pub fn inner(&self) -> &PrometheusCollector {
        &self.inner
    }
}

fn topic_queries(topic: &str) -> [QueryConfig; 3] {
    let messages_in =
        specialize::selector("kafka_server_messages_in_per_sec_per_topic_total", "topic", topic);
    let bytes_in =
        specialize::selector("kafka_server_total_bytes_in_per_sec_per_topic", "topic", topic);
    let bytes_out =
        specialize::selector("kafka_server_total_bytes_out_per_sec_per_topic", "topic", topic);

    [
        QueryConfig::new(
            format!("msg-rate-in-per-second[{}]", topic),
            format!("rate({}[{}])", messages_in, RATE_WINDOW),
        )
        .with_unit("msg/s")
        .with_interval(SAMPLE_INTERVAL),
        QueryConfig::new(
            format!("msg-megabytes-in-per-second[{}]", topic),
            format!("rate({}[{}])/{}", bytes_in, RATE_WINDOW, MEGABYTE),
        )
        .with_unit("MB/s")
        .with_interval(SAMPLE_INTERVAL),
        QueryConfig::new(
            format!("msg-megabytes-out-per-second[{}]", topic),
            format!("rate({}[{}])/{}", bytes_out, RATE_WINDOW, MEGABYTE),
        )
        .with_unit("MB/s")
        .with_interval(SAMPLE_INTERVAL),
    ]
}

fn specialized_config(mut settings: Settings) -> Result<PrometheusConfig, MetricsError> {
    let topics: Vec<String> = specialize::take_key(&mut settings, "topics")?;
    let queries = topics.iter().flat_map(|t| topic_queries(t)).collect();
    specialize::with_queries(settings, queries)
}

#[async_trait]
impl Collector for KafkaCollector {
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
