//! Cardinality-bounded metrics collection for primitive executions.
//!
//! The collector records, per `(primitive_name, primitive_type)` label set:
//! execution/success/failure counters, duration sum/min/max, a fixed-bound
//! histogram, an in-flight gauge, and an SLO-compliant count. Once the
//! number of distinct label sets reaches the configured ceiling, new sets
//! are either merged into a consistently-hashed bucket or collapsed into a
//! single overflow label -- resolution is lost, counts never are.
//!
//! Internals are dashmap + atomics so a metrics-exposition thread can read
//! concurrently with the execution path; the hot path never holds a lock
//! for longer than an increment.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};

use weft_types::error::ConfigError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What happens to label sets past the cardinality ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Hash new label sets into one of `buckets` stable buckets. The same
    /// label set always lands in the same bucket.
    HashBucket { buckets: usize },
    /// Collapse all new label sets into one shared overflow label.
    SingleOverflow,
}

/// Collector configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Maximum distinct label sets retained at full resolution.
    pub max_label_sets: usize,
    /// Overflow handling once the ceiling is reached.
    pub overflow_policy: OverflowPolicy,
    /// Latency threshold for the SLO compliance ratio, in milliseconds.
    pub slo_latency_ms: u64,
    /// Upper bounds of the duration histogram buckets, in milliseconds.
    pub histogram_bounds_ms: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            max_label_sets: 256,
            overflow_policy: OverflowPolicy::SingleOverflow,
            slo_latency_ms: 1_000,
            histogram_bounds_ms: vec![
                1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0,
                5_000.0, 10_000.0,
            ],
        }
    }
}

impl MetricsConfig {
    /// Check all knobs are in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_label_sets == 0 {
            return Err(ConfigError::invalid("max_label_sets", "must be > 0"));
        }
        if let OverflowPolicy::HashBucket { buckets } = self.overflow_policy {
            if buckets == 0 {
                return Err(ConfigError::invalid("buckets", "must be > 0"));
            }
        }
        if self.histogram_bounds_ms.is_empty() {
            return Err(ConfigError::Empty {
                what: "histogram_bounds_ms".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Label sets
// ---------------------------------------------------------------------------

/// The label dimensions metrics are keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MetricLabelSet {
    /// Primitive name as given at construction.
    pub primitive_name: String,
    /// Primitive kind, e.g. `"sequential"`, `"retry"`, `"leaf"`.
    pub primitive_type: String,
}

impl MetricLabelSet {
    /// Build a label set from borrowed parts.
    pub fn new(primitive_name: impl Into<String>, primitive_type: impl Into<String>) -> Self {
        Self {
            primitive_name: primitive_name.into(),
            primitive_type: primitive_type.into(),
        }
    }
}

/// Shared label for the single-overflow policy.
const OVERFLOW_LABEL: &str = "__overflow__";

// ---------------------------------------------------------------------------
// Per-label state
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct LabelMetrics {
    executions: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    duration_sum_ms: AtomicU64,
    duration_min_ms: AtomicU64,
    duration_max_ms: AtomicU64,
    slo_met: AtomicU64,
    in_flight: AtomicI64,
    /// One count per configured bound, plus a final +Inf bucket.
    buckets: Vec<AtomicU64>,
}

impl LabelMetrics {
    fn new(bound_count: usize) -> Self {
        Self {
            executions: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            duration_sum_ms: AtomicU64::new(0),
            duration_min_ms: AtomicU64::new(u64::MAX),
            duration_max_ms: AtomicU64::new(0),
            slo_met: AtomicU64::new(0),
            in_flight: AtomicI64::new(0),
            buckets: (0..=bound_count).map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots (pull-based export)
// ---------------------------------------------------------------------------

/// One histogram bucket in an exported snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct HistogramBucket {
    /// Inclusive upper bound in milliseconds; `f64::INFINITY` for the last.
    pub le_ms: f64,
    /// Observations that fell into this bucket.
    pub count: u64,
}

/// Point-in-time export of one label set's metric families.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// The (possibly bucketed or overflow) label set.
    pub labels: MetricLabelSet,
    /// Execution counter.
    pub executions: u64,
    /// Successful executions.
    pub successes: u64,
    /// Failed executions.
    pub failures: u64,
    /// Sum of observed durations in milliseconds.
    pub duration_sum_ms: u64,
    /// Smallest observed duration, if anything was recorded.
    pub duration_min_ms: Option<u64>,
    /// Largest observed duration in milliseconds.
    pub duration_max_ms: u64,
    /// Duration histogram.
    pub histogram: Vec<HistogramBucket>,
    /// Currently in-flight executions (gauge).
    pub in_flight: i64,
    /// Successes under the SLO latency threshold divided by total
    /// executions (gauge).
    pub slo_compliance: f64,
}

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

/// Thread-safe, cardinality-bounded execution metrics collector.
pub struct MetricsCollector {
    config: Arc<MetricsConfig>,
    series: DashMap<MetricLabelSet, Arc<LabelMetrics>>,
}

impl MetricsCollector {
    /// Create a collector with the given configuration.
    pub fn new(config: MetricsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            series: DashMap::new(),
        })
    }

    /// Create a collector with default configuration.
    pub fn with_defaults() -> Self {
        Self {
            config: Arc::new(MetricsConfig::default()),
            series: DashMap::new(),
        }
    }

    /// Begin tracking one execution: bumps the in-flight gauge and returns
    /// a guard that records the outcome on completion.
    pub fn begin(&self, primitive_name: &str, primitive_type: &str) -> ExecutionTimer {
        let labels = self.resolve(MetricLabelSet::new(primitive_name, primitive_type));
        let metrics = self.series_for(&labels);
        metrics.in_flight.fetch_add(1, Ordering::Relaxed);
        ExecutionTimer {
            config: Arc::clone(&self.config),
            metrics,
            started: Instant::now(),
            completed: false,
        }
    }

    /// Record one pre-measured execution outcome.
    pub fn record(
        &self,
        primitive_name: &str,
        primitive_type: &str,
        success: bool,
        duration: Duration,
    ) {
        let labels = self.resolve(MetricLabelSet::new(primitive_name, primitive_type));
        let metrics = self.series_for(&labels);
        record_into(&self.config, &metrics, success, duration);
    }

    /// Number of distinct label sets currently retained.
    pub fn label_set_count(&self) -> usize {
        self.series.len()
    }

    /// Total executions recorded across every label set.
    pub fn total_executions(&self) -> u64 {
        self.series
            .iter()
            .map(|entry| entry.value().executions.load(Ordering::Relaxed))
            .sum()
    }

    /// Export a point-in-time snapshot of every label set.
    pub fn export(&self) -> Vec<MetricsSnapshot> {
        let mut snapshots: Vec<MetricsSnapshot> = self
            .series
            .iter()
            .map(|entry| {
                let labels = entry.key().clone();
                let m = entry.value();
                let executions = m.executions.load(Ordering::Relaxed);
                let min = m.duration_min_ms.load(Ordering::Relaxed);

                let mut histogram: Vec<HistogramBucket> = self
                    .config
                    .histogram_bounds_ms
                    .iter()
                    .enumerate()
                    .map(|(i, &le_ms)| HistogramBucket {
                        le_ms,
                        count: m.buckets[i].load(Ordering::Relaxed),
                    })
                    .collect();
                histogram.push(HistogramBucket {
                    le_ms: f64::INFINITY,
                    count: m.buckets[self.config.histogram_bounds_ms.len()]
                        .load(Ordering::Relaxed),
                });

                MetricsSnapshot {
                    labels,
                    executions,
                    successes: m.successes.load(Ordering::Relaxed),
                    failures: m.failures.load(Ordering::Relaxed),
                    duration_sum_ms: m.duration_sum_ms.load(Ordering::Relaxed),
                    duration_min_ms: (min != u64::MAX).then_some(min),
                    duration_max_ms: m.duration_max_ms.load(Ordering::Relaxed),
                    histogram,
                    in_flight: m.in_flight.load(Ordering::Relaxed),
                    slo_compliance: if executions == 0 {
                        1.0
                    } else {
                        m.slo_met.load(Ordering::Relaxed) as f64 / executions as f64
                    },
                }
            })
            .collect();

        snapshots.sort_by(|a, b| {
            (a.labels.primitive_name.as_str(), a.labels.primitive_type.as_str())
                .cmp(&(b.labels.primitive_name.as_str(), b.labels.primitive_type.as_str()))
        });
        snapshots
    }

    /// Map a label set to the one actually recorded, applying the
    /// cardinality ceiling.
    fn resolve(&self, labels: MetricLabelSet) -> MetricLabelSet {
        if self.series.contains_key(&labels) {
            return labels;
        }
        if self.series.len() < self.config.max_label_sets {
            return labels;
        }
        tracing::debug!(
            primitive = labels.primitive_name.as_str(),
            max = self.config.max_label_sets,
            "label cardinality ceiling reached, folding into overflow"
        );
        match self.config.overflow_policy {
            OverflowPolicy::HashBucket { buckets } => {
                let bucket = consistent_bucket(&labels, buckets);
                MetricLabelSet::new(format!("__bucket_{bucket}__"), "overflow")
            }
            OverflowPolicy::SingleOverflow => {
                MetricLabelSet::new(OVERFLOW_LABEL, "overflow")
            }
        }
    }

    fn series_for(&self, labels: &MetricLabelSet) -> Arc<LabelMetrics> {
        self.series
            .entry(labels.clone())
            .or_insert_with(|| Arc::new(LabelMetrics::new(self.config.histogram_bounds_ms.len())))
            .clone()
    }
}

/// Fold one outcome into a label set's counters.
fn record_into(
    config: &MetricsConfig,
    metrics: &LabelMetrics,
    success: bool,
    duration: Duration,
) {
    let duration_ms = duration.as_millis() as u64;

    metrics.executions.fetch_add(1, Ordering::Relaxed);
    if success {
        metrics.successes.fetch_add(1, Ordering::Relaxed);
        if duration_ms <= config.slo_latency_ms {
            metrics.slo_met.fetch_add(1, Ordering::Relaxed);
        }
    } else {
        metrics.failures.fetch_add(1, Ordering::Relaxed);
    }

    metrics
        .duration_sum_ms
        .fetch_add(duration_ms, Ordering::Relaxed);
    metrics
        .duration_min_ms
        .fetch_min(duration_ms, Ordering::Relaxed);
    metrics
        .duration_max_ms
        .fetch_max(duration_ms, Ordering::Relaxed);

    let idx = config
        .histogram_bounds_ms
        .iter()
        .position(|&bound| duration_ms as f64 <= bound)
        .unwrap_or(config.histogram_bounds_ms.len());
    metrics.buckets[idx].fetch_add(1, Ordering::Relaxed);
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("label_sets", &self.series.len())
            .field("max_label_sets", &self.config.max_label_sets)
            .finish()
    }
}

/// Deterministic bucket assignment: same label set, same bucket.
fn consistent_bucket(labels: &MetricLabelSet, buckets: usize) -> usize {
    let mut hasher = Sha256::new();
    hasher.update(labels.primitive_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(labels.primitive_type.as_bytes());
    let digest = hasher.finalize();
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(word) % buckets as u64) as usize
}

// ---------------------------------------------------------------------------
// ExecutionTimer
// ---------------------------------------------------------------------------

/// Guard tracking one in-flight execution.
///
/// `complete` records the outcome and duration; dropping the guard without
/// completing only releases the in-flight gauge.
pub struct ExecutionTimer {
    config: Arc<MetricsConfig>,
    metrics: Arc<LabelMetrics>,
    started: Instant,
    completed: bool,
}

impl ExecutionTimer {
    /// Record the outcome with the guard's own elapsed time.
    pub fn complete(mut self, success: bool) {
        let elapsed = self.started.elapsed();
        self.finish(success, elapsed);
    }

    /// Record the outcome with an externally measured duration.
    pub fn complete_with_duration(mut self, success: bool, duration: Duration) {
        self.finish(success, duration);
    }

    fn finish(&mut self, success: bool, duration: Duration) {
        self.completed = true;
        self.metrics.in_flight.fetch_sub(1, Ordering::Relaxed);
        record_into(&self.config, &self.metrics, success, duration);
    }
}

impl Drop for ExecutionTimer {
    fn drop(&mut self) {
        if !self.completed {
            self.metrics.in_flight.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
