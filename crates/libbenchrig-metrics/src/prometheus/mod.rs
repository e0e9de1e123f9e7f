//! Generic collector polling a Prometheus exposition endpoint

mod config;
pub mod exposition;
pub mod query;

pub use config::{PrometheusConfig, QueryConfig, DEFAULT_SCRAPE_INTERVAL};

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libbenchrig_core::Settings;
use reqwest::{Client, Url};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Span};

use self::config::CompiledQuery;
use self::query::Scrape;
use crate::collector::{Collector, QueryResults, Sample};
use crate::error::MetricsError;
use crate::registry::CollectorRegistry;

pub const TYPE: &str = "prometheus";

/// Upper bound on a single HTTP scrape
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on retained scrapes regardless of query windows
const MAX_HISTORY: usize = 600;

pub fn register(registry: &mut CollectorRegistry) {
    registry.register(TYPE, |span, name| Box::new(PrometheusCollector::new(span, name)));
}

pub struct PrometheusCollector {
    name: String,
    type_name: &'static str,
    span: Span,
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    config: Option<PrometheusConfig>,
    url: Option<Url>,
    client: Option<Client>,
    queries: Vec<CompiledQuery>,
    history: VecDeque<Scrape>,
    capacity: usize,
    last_sampled: Vec<Option<DateTime<Utc>>>,
    results: Vec<QueryResults>,
}

impl PrometheusCollector {
    pub fn new(parent: Span, name: &str) -> Self {
        Self::with_type(parent, name, TYPE)
    }

    /// Collector reporting under another type name, for specializations
    pub(crate) fn with_type(parent: Span, name: &str, type_name: &'static str) -> Self {
        let span = tracing::info_span!(parent: &parent, "collector", collector = name, kind = type_name);
        Self {
            name: name.to_string(),
            type_name,
            span,
            state: RwLock::new(State::default()),
        }
    }

    /// The active configuration, if any
    pub fn config(&self) -> Option<PrometheusConfig> {
        self.read().config.clone()
    }

    /// Apply an already decoded configuration
    pub fn apply(&mut self, config: PrometheusConfig) -> Result<(), MetricsError> {
        let url = config.parsed_url()?;
        let queries = config.compile()?;
        let client = Client::builder().timeout(SCRAPE_TIMEOUT).build()?;

        let capacity = history_capacity(config.scrape_interval, &queries);
        let results = queries
            .iter()
            .map(|q| QueryResults {
                name: q.config.name.clone(),
                query: q.config.query.clone(),
                unit: q.config.unit.clone(),
                samples: Vec::new(),
            })
            .collect();

        debug!(parent: &self.span, url = %url, queries = queries.len(), "Collector configured");

        *self.state.get_mut().unwrap_or_else(PoisonError::into_inner) = State {
            last_sampled: vec![None; queries.len()],
            config: Some(config),
            url: Some(url),
            client: Some(client),
            queries,
            history: VecDeque::with_capacity(capacity),
            capacity,
            results,
        };
        Ok(())
    }

    /// Record one scrape body taken at `at` and sample every query that is
    /// due. Returns the number of samples recorded.
    pub fn record_scrape(&self, at: DateTime<Utc>, body: &str) -> Result<usize, MetricsError> {
        let series = exposition::parse(body)?;
        let mut state = self.write();
        let Some(scrape_interval) = state.config.as_ref().map(|c| c.scrape_interval) else {
            return Err(MetricsError::NotConfigured(self.name.clone()));
        };

        state.history.push_back(Scrape { at, series });
        while state.history.len() > state.capacity {
            state.history.pop_front();
        }

        // Ticks drift, so a query is due once it is within half a scrape of
        // its interval.
        let tolerance = to_chrono(scrape_interval / 2);
        let state = &mut *state;
        let mut recorded = 0;
        for (idx, query) in state.queries.iter().enumerate() {
            let due = match state.last_sampled[idx] {
                None => true,
                Some(prev) => {
                    at - prev + tolerance >= to_chrono(query.interval)
                }
            };
            if !due {
                continue;
            }
            match query.expr.evaluate(&state.history) {
                Some(value) if value.is_finite() => {
                    state.results[idx].samples.push(Sample { at, value });
                    state.last_sampled[idx] = Some(at);
                    recorded += 1;
                }
                _ => {}
            }
        }
        Ok(recorded)
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Enough scrapes to cover the longest rate window plus one
fn history_capacity(scrape_interval: Duration, queries: &[CompiledQuery]) -> usize {
    let lookback = queries
        .iter()
        .map(|q| q.expr.lookback())
        .max()
        .unwrap_or(Duration::ZERO);
    let per_scrape = scrape_interval.as_secs_f64().max(f64::EPSILON);
    let needed = (lookback.as_secs_f64() / per_scrape).ceil() as usize + 2;
    needed.min(MAX_HISTORY)
}

async fn fetch(client: &Client, url: &Url) -> Result<String, MetricsError> {
    let body = client
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(body)
}

#[async_trait]
impl Collector for PrometheusCollector {
    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, settings: Settings) -> Result<(), MetricsError> {
        let config = PrometheusConfig::from_settings(settings)?;
        self.apply(config)
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), MetricsError> {
        let (client, url, period) = {
            let state = self.read();
            match (&state.client, &state.url, &state.config) {
                (Some(client), Some(url), Some(config)) => {
                    (client.clone(), url.clone(), config.scrape_interval)
                }
                _ => return Err(MetricsError::NotConfigured(self.name.clone())),
            }
        };

        info!(parent: &self.span, url = %url, interval = ?period, "Collector started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let at = Utc::now();
            let fetched = tokio::select! {
                _ = cancel.cancelled() => break,
                fetched = fetch(&client, &url) => fetched,
            };

            match fetched.and_then(|body| self.record_scrape(at, &body)) {
                Ok(recorded) => debug!(parent: &self.span, recorded, "Scraped"),
                Err(e) => warn!(parent: &self.span, error = %e, "Scrape failed"),
            }
        }

        let samples: usize = self.read().results.iter().map(|r| r.samples.len()).sum();
        info!(parent: &self.span, samples, "Collector stopped");
        Ok(())
    }

    fn results(&self) -> Vec<QueryResults> {
        self.read().results.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn configured(queries: serde_json::Value) -> PrometheusCollector {
        let mut collector = PrometheusCollector::new(Span::none(), "prom");
        let settings = json!({
            "url": "http://127.0.0.1:9/metrics",
            "scrape-interval": "1s",
            "queries": queries,
        });
        let serde_json::Value::Object(settings) = settings else {
            unreachable!()
        };
        collector.configure(settings).unwrap();
        collector
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_samples_recorded_per_query() {
        let collector = configured(json!([
            {"name": "total", "query": "requests_total"},
            {"name": "rps", "query": "rate(requests_total[2s])", "unit": "req/s"},
        ]));

        assert_eq!(collector.record_scrape(at(0), "requests_total 10\n").unwrap(), 1);
        assert_eq!(collector.record_scrape(at(1), "requests_total 30\n").unwrap(), 2);
        assert_eq!(collector.record_scrape(at(2), "requests_total 70\n").unwrap(), 2);

        let results = collector.results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].samples.len(), 3);
        assert_eq!(results[0].samples[2].value, 70.0);

        assert_eq!(results[1].unit.as_deref(), Some("req/s"));
        let rates: Vec<f64> = results[1].samples.iter().map(|s| s.value).collect();
        assert_eq!(rates, vec![20.0, 30.0]);
    }

    #[test]
    fn test_query_interval_gates_samples() {
        let collector = configured(json!([
            {"name": "slow", "query": "up", "interval": "3s"},
        ]));

        for secs in 0..7 {
            collector.record_scrape(at(secs), "up 1\n").unwrap();
        }
        let times: Vec<_> = collector.results()[0].samples.iter().map(|s| s.at).collect();
        assert_eq!(times, vec![at(0), at(3), at(6)]);
    }

    #[test]
    fn test_history_is_bounded() {
        let collector = configured(json!([
            {"name": "rps", "query": "rate(c[2s])"},
        ]));
        for secs in 0..50 {
            collector.record_scrape(at(secs), &format!("c {}\n", secs * 10)).unwrap();
        }
        assert_eq!(collector.read().history.len(), 4);
        assert_eq!(collector.results()[0].samples.last().unwrap().value, 10.0);
    }

    #[test]
    fn test_bad_scrape_keeps_state() {
        let collector = configured(json!([{"name": "up", "query": "up"}]));
        assert!(collector.record_scrape(at(0), "up{").is_err());
        assert!(collector.read().history.is_empty());
    }

    #[test]
    fn test_reconfigure_replaces() {
        let mut collector = configured(json!([{"name": "a", "query": "a"}]));
        collector.record_scrape(at(0), "a 1\n").unwrap();

        let serde_json::Value::Object(settings) = json!({"url": "http://localhost/metrics"}) else {
            unreachable!()
        };
        collector.configure(settings).unwrap();

        assert!(collector.results().is_empty());
        assert_eq!(collector.config().unwrap().scrape_interval, DEFAULT_SCRAPE_INTERVAL);
    }

    #[test]
    fn test_unconfigured() {
        let collector = PrometheusCollector::new(Span::none(), "idle");
        assert!(matches!(
            collector.record_scrape(at(0), "up 1\n"),
            Err(MetricsError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_run_requires_configuration() {
        let collector = PrometheusCollector::new(Span::none(), "idle");
        let err = collector.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, MetricsError::NotConfigured(name) if name == "idle"));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel_with_unreachable_endpoint() {
        let collector = configured(json!([]));
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.cancel();
        });

        collector.run(cancel).await.unwrap();
        assert!(collector.results().is_empty());
    }
}
