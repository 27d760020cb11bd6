//! Strategy types for the adaptive controller.
//!
//! A `Strategy` is a named, versioned set of resilience parameters scoped to
//! one context pattern. Exactly one baseline strategy exists per adaptive
//! wrapper and is never deleted; learned strategies are additional entries
//! keyed by their context pattern.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LearningError;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// The numeric knobs a strategy controls.
///
/// One parameter set covers every tunable wrapper kind; a wrapper reads
/// only the knobs it cares about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StrategyParameters {
    /// Cache entry time-to-live, in seconds.
    pub ttl_seconds: f64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Exponential backoff base.
    pub backoff_base: f64,
    /// Timeout deadline, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for StrategyParameters {
    fn default() -> Self {
        Self {
            ttl_seconds: 60.0,
            max_retries: 3,
            backoff_base: 2.0,
            timeout_ms: 30_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Measured outcomes for executions attributed to one strategy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct StrategyMetrics {
    /// Executions that returned a functional success.
    pub success_count: u64,
    /// Executions that returned a functional failure.
    pub failure_count: u64,
    /// Total executions attributed to this strategy.
    pub total_executions: u64,
    /// Running average latency in milliseconds.
    pub average_latency_ms: f64,
}

impl StrategyMetrics {
    /// Fold one execution outcome into the running aggregates.
    pub fn record(&mut self, success: bool, latency_ms: f64) {
        self.total_executions += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        let n = self.total_executions as f64;
        self.average_latency_ms += (latency_ms - self.average_latency_ms) / n;
    }

    /// Fraction of successful executions; 1.0 when nothing was recorded yet.
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            1.0
        } else {
            self.success_count as f64 / self.total_executions as f64
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// Where a learned strategy stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningPhase {
    /// Accumulating baseline observations for a context pattern.
    Observing,
    /// A candidate parameter set has been derived but not yet measured.
    Candidate,
    /// The candidate is accumulating its validation window.
    Validating,
    /// The candidate won and is the active strategy for its pattern.
    Promoted,
    /// The candidate regressed and was discarded.
    Rejected,
}

/// A named, versioned parameter set owned by one adaptive wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Strategy {
    /// Strategy name; `"baseline"` for the always-present default.
    pub name: String,
    /// Derived grouping key, e.g. `"production:fast"`.
    pub context_pattern: String,
    /// The knobs this strategy applies.
    pub parameters: StrategyParameters,
    /// Measured outcomes attributed to this strategy.
    pub metrics: StrategyMetrics,
    /// Whether this strategy survived validation.
    pub validated: bool,
    /// Executions attributed to this strategy.
    pub usage_count: u64,
    /// When the strategy was created.
    pub created_at: DateTime<Utc>,
}

impl Strategy {
    /// The baseline strategy for a context pattern. Always validated,
    /// never deleted.
    pub fn baseline(context_pattern: impl Into<String>, parameters: StrategyParameters) -> Self {
        Self {
            name: "baseline".to_string(),
            context_pattern: context_pattern.into(),
            parameters,
            metrics: StrategyMetrics::default(),
            validated: true,
            usage_count: 0,
            created_at: Utc::now(),
        }
    }

    /// A freshly derived candidate for a context pattern.
    pub fn candidate(
        context_pattern: impl Into<String>,
        parameters: StrategyParameters,
    ) -> Self {
        let context_pattern = context_pattern.into();
        Self {
            name: format!("candidate:{context_pattern}"),
            context_pattern,
            parameters,
            metrics: StrategyMetrics::default(),
            validated: false,
            usage_count: 0,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Context pattern derivation
// ---------------------------------------------------------------------------

/// Metadata key naming the deployment environment.
pub const METADATA_ENVIRONMENT: &str = "environment";

/// Metadata key naming the workload class.
pub const METADATA_WORKLOAD: &str = "workload";

/// Derive the strategy grouping key from execution metadata.
///
/// Combines the `environment` and `workload` metadata entries into
/// `"<environment>:<workload>"`, substituting `"any"` for a single missing
/// half. Fails only when neither key is present.
pub fn derive_context_pattern(
    metadata: &BTreeMap<String, String>,
) -> Result<String, LearningError> {
    let environment = metadata.get(METADATA_ENVIRONMENT);
    let workload = metadata.get(METADATA_WORKLOAD);

    if environment.is_none() && workload.is_none() {
        return Err(LearningError::ContextExtraction {
            message: format!(
                "metadata has neither '{METADATA_ENVIRONMENT}' nor '{METADATA_WORKLOAD}'"
            ),
        });
    }

    Ok(format!(
        "{}:{}",
        environment.map_or("any", String::as_str),
        workload.map_or("any", String::as_str)
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
