use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a benchmark configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("duplicate {kind} name: {name}")]
    Duplicate { kind: &'static str, name: String },
}

impl ConfigError {
    /// Create an `Invalid` error from anything printable
    pub fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::Invalid(msg.into())
    }
}
