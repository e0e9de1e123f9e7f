//! Metrics collectors for benchrig
//!
//! A collector samples an external source during the test window of a run.
//! Collectors are created by type name through a [`CollectorRegistry`],
//! configured from the free-form settings table of the benchmark file and
//! exported as JSON once the window closes.
//!
//! Built-in types:
//!
//! - `prometheus`: polls a text exposition endpoint and evaluates queries
//! - `kafka`: prometheus plus per-topic broker throughput queries
//! - `docker`: prometheus plus per-container cAdvisor queries

pub mod collector;
pub mod docker;
pub mod error;
pub mod kafka;
pub mod prometheus;
pub mod registry;
mod specialize;

pub use collector::{Collector, CollectorReport, QueryResults, Sample};
pub use error::MetricsError;
pub use registry::{CollectorFactory, CollectorRegistry};
