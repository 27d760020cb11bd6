//! Observability infrastructure for the weft engine.
//!
//! - `metrics` -- cardinality-bounded execution metrics with pull-based export
//! - `sampler` -- consistent head sampling plus error/latency tail upgrades
//! - `tracing_setup` -- subscriber init with optional OpenTelemetry export

pub mod metrics;
pub mod sampler;
pub mod tracing_setup;

pub use metrics::{
    ExecutionTimer, HistogramBucket, MetricLabelSet, MetricsCollector, MetricsConfig,
    MetricsSnapshot, OverflowPolicy,
};
pub use sampler::{Sampler, SamplerConfig};
pub use tracing_setup::TracingOptions;
