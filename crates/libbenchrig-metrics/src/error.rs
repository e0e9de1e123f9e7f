use thiserror::Error;

/// Errors raised by collectors and the collector registry
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("unknown collector type: {0}")]
    UnknownCollector(String),

    #[error("failed to decode settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid query {query:?}: {reason}")]
    InvalidQuery { query: String, reason: String },

    #[error("failed to configure {collector} collector: {source}")]
    Configure {
        collector: &'static str,
        #[source]
        source: Box<MetricsError>,
    },

    #[error("collector {0} used before it was configured")]
    NotConfigured(String),

    #[error("scrape failed: {0}")]
    Scrape(#[from] reqwest::Error),

    #[error("invalid exposition line {line}: {reason}")]
    Exposition { line: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MetricsError {
    /// Wrap a configuration failure with the type of the collector it came from
    pub fn configure(collector: &'static str, source: MetricsError) -> Self {
        MetricsError::Configure {
            collector,
            source: Box::new(source),
        }
    }

    /// True for errors caused by the benchmark configuration rather than the
    /// environment
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MetricsError::UnknownCollector(_)
                | MetricsError::Settings(_)
                | MetricsError::InvalidSetting { .. }
                | MetricsError::InvalidUrl { .. }
                | MetricsError::InvalidQuery { .. }
                | MetricsError::Configure { .. }
        )
    }
}
