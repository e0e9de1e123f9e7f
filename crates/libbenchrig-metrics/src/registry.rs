//! Mapping from collector type name to factory

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::Span;

use crate::collector::Collector;
use crate::error::MetricsError;
use crate::{docker, kafka, prometheus};

/// Creates a collector instance from a parent span and an instance name
pub type CollectorFactory = Arc<dyn Fn(Span, &str) -> Box<dyn Collector> + Send + Sync>;

/// Registry of collector types
///
/// Built once at startup and handed to the run engine.
#[derive(Clone, Default)]
pub struct CollectorRegistry {
    factories: HashMap<String, CollectorFactory>,
}

impl fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorRegistry")
            .field("types", &self.types())
            .finish()
    }
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every collector shipped in this crate
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        prometheus::register(&mut registry);
        kafka::register(&mut registry);
        docker::register(&mut registry);
        registry
    }

    /// Register a factory. A later registration for the same type replaces
    /// the earlier one.
    pub fn register<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn(Span, &str) -> Box<dyn Collector> + Send + Sync + 'static,
    {
        self.factories.insert(type_name.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Instantiate an unconfigured collector
    pub fn create(
        &self,
        type_name: &str,
        span: Span,
        name: &str,
    ) -> Result<Box<dyn Collector>, MetricsError> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| MetricsError::UnknownCollector(type_name.to_string()))?;
        Ok(factory(span, name))
    }

    /// Registered type names, sorted
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prometheus::PrometheusCollector;

    #[test]
    fn test_builtin_types() {
        let registry = CollectorRegistry::with_builtin();
        assert_eq!(registry.types(), vec!["docker", "kafka", "prometheus"]);
    }

    #[test]
    fn test_create_by_type() {
        let registry = CollectorRegistry::with_builtin();
        let collector = registry.create("kafka", Span::none(), "broker").unwrap();

        assert_eq!(collector.type_name(), "kafka");
        assert_eq!(collector.name(), "broker");
    }

    #[test]
    fn test_unknown_type() {
        let registry = CollectorRegistry::with_builtin();
        let err = registry.create("statsd", Span::none(), "x").err().unwrap();

        assert!(matches!(err, MetricsError::UnknownCollector(ref t) if t == "statsd"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = CollectorRegistry::new();
        registry.register("custom", |span, name| {
            Box::new(PrometheusCollector::new(span, &format!("first-{}", name)))
        });
        registry.register("custom", |span, name| {
            Box::new(PrometheusCollector::new(span, &format!("second-{}", name)))
        });

        let collector = registry.create("custom", Span::none(), "x").unwrap();
        assert_eq!(collector.name(), "second-x");
        assert_eq!(registry.types(), vec!["custom"]);
    }
}
