//! Error taxonomies for the weft engine.
//!
//! One enum per concern, in line with the rest of the workspace:
//! - `EngineError` -- functional failures that reach the caller of `execute`.
//! - `LearningError` -- adaptive-subsystem failures. Always caught at the
//!   controller boundary and downgraded to a log entry; never surfaced as
//!   the result of an execution.
//! - `ConfigError` -- construction-time validation failures.

use thiserror::Error;

/// Functional errors surfaced to callers of `execute`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Transient failure (network, rate limit, overload). Safe to retry.
    #[error("retryable: {message}")]
    Retryable { message: String },

    /// Permanent failure (validation, 4xx-equivalent). Retrying will not help.
    #[error("non-retryable: {message}")]
    NonRetryable { message: String },

    /// Deadline exceeded while racing a wrapped execution.
    #[error("execution timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl EngineError {
    /// Shorthand for a transient failure.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
        }
    }

    /// Shorthand for a permanent failure.
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self::NonRetryable {
            message: message.into(),
        }
    }

    /// Classify whether re-executing is safe.
    ///
    /// Timeouts count as transient: the next attempt may land under the
    /// deadline.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Retryable { .. } | EngineError::Timeout { .. }
        )
    }
}

/// Failures inside the adaptive learning subsystem.
///
/// These never escape the controller: the execution path logs them and
/// falls back to the last-known-good strategy.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LearningError {
    /// Learning is suspended because too many executions failed.
    #[error("learning circuit breaker open (failure rate {failure_rate:.2}), cooling down for {cooldown_secs}s")]
    CircuitBreakerOpen {
        failure_rate: f64,
        cooldown_secs: u64,
    },

    /// A candidate strategy failed validation.
    #[error("strategy '{strategy}' failed validation: {reason}")]
    StrategyValidation { strategy: String, reason: String },

    /// A candidate regressed against the baseline on a specific metric.
    #[error("performance regression on {metric}: baseline {baseline:.4}, candidate {candidate:.4}")]
    PerformanceRegression {
        metric: String,
        baseline: f64,
        candidate: f64,
    },

    /// Lookup of a strategy by name found nothing.
    #[error("strategy '{name}' not found; available: {}", available.join(", "))]
    StrategyNotFound {
        name: String,
        available: Vec<String>,
    },

    /// The context pattern could not be derived from execution metadata.
    #[error("context pattern extraction failed: {message}")]
    ContextExtraction { message: String },
}

/// Construction-time configuration errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// A numeric knob is out of its valid range.
    #[error("invalid value for '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// A router's default route does not exist in its route table.
    #[error("default route '{route}' not present in routes: {}", available.join(", "))]
    UnknownDefaultRoute {
        route: String,
        available: Vec<String>,
    },

    /// A combinator was given nothing to execute.
    #[error("{what} must not be empty")]
    Empty { what: String },
}

impl ConfigError {
    /// Shorthand for an out-of-range knob.
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
