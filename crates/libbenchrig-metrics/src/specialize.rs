//! Shared plumbing for collectors that specialize the prometheus collector

use std::time::Duration;

use libbenchrig_core::Settings;
use serde::de::DeserializeOwned;

use crate::error::MetricsError;
use crate::prometheus::{PrometheusConfig, QueryConfig};

/// Rate window used by synthesized queries
pub(crate) const RATE_WINDOW: &str = "2s";

/// Sampling interval of synthesized queries
pub(crate) const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Bytes per megabyte in synthesized queries
pub(crate) const MEGABYTE: u64 = 1_048_576;

/// Remove `key` from the settings and decode it strictly. A missing key
/// decodes as the type's default.
pub(crate) fn take_key<T>(settings: &mut Settings, key: &str) -> Result<T, MetricsError>
where
    T: DeserializeOwned + Default,
{
    match settings.remove(key) {
        None => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| MetricsError::InvalidSetting {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Decode the remaining settings and place `synthesized` ahead of any
/// user-supplied queries
pub(crate) fn with_queries(
    settings: Settings,
    synthesized: Vec<QueryConfig>,
) -> Result<PrometheusConfig, MetricsError> {
    let mut config = PrometheusConfig::from_settings(settings)?;
    let user = std::mem::replace(&mut config.queries, synthesized);
    config.queries.extend(user);
    Ok(config)
}

/// `name{label="value"}` with the value quoted and escaped
pub(crate) fn selector(metric: &str, label: &str, value: &str) -> String {
    format!("{}{{{}={:?}}}", metric, label, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(value: serde_json::Value) -> Settings {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("settings must be an object"),
        }
    }

    #[test]
    fn test_take_key_removes() {
        let mut s = settings(json!({"url": "http://x/metrics", "topics": ["a", "b"]}));
        let topics: Vec<String> = take_key(&mut s, "topics").unwrap();

        assert_eq!(topics, vec!["a", "b"]);
        assert!(!s.contains_key("topics"));
    }

    #[test]
    fn test_take_key_missing_is_default() {
        let mut s = settings(json!({"url": "http://x/metrics"}));
        let topics: Vec<String> = take_key(&mut s, "topics").unwrap();
        assert!(topics.is_empty());
    }

    #[test]
    fn test_take_key_wrong_type() {
        let mut s = settings(json!({"topics": "orders"}));
        let err = take_key::<Vec<String>>(&mut s, "topics").unwrap_err();
        assert!(matches!(err, MetricsError::InvalidSetting { ref key, .. } if key == "topics"));
    }

    #[test]
    fn test_synthesized_queries_first() {
        let s = settings(json!({
            "url": "http://x/metrics",
            "queries": [{"name": "mine", "query": "up"}]
        }));
        let config = with_queries(s, vec![QueryConfig::new("generated", "up")]).unwrap();

        let names: Vec<_> = config.queries.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["generated", "mine"]);
    }

    #[test]
    fn test_selector_escapes() {
        assert_eq!(selector("m", "topic", "orders"), r#"m{topic="orders"}"#);
        assert_eq!(selector("m", "name", r#"a"b"#), r#"m{name="a\"b"}"#);
    }
}
