//! Validated configuration structs for resilience wrappers and the
//! adaptive controller.
//!
//! Every config is constructed through a validating `new` (or checked with
//! `validate` after deserialization); out-of-range knobs are rejected at
//! construction time, never discovered mid-execution.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Configuration for the `Retry` wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = no retries).
    pub max_retries: u32,
    /// Exponential backoff base; delay grows as `backoff_base^attempt`.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,
    /// Whether to apply full jitter to each delay.
    #[serde(default)]
    pub jitter: bool,
    /// Base delay multiplied by the exponential, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_backoff_base() -> f64 {
    2.0
}

fn default_base_delay_ms() -> u64 {
    100
}

impl RetryConfig {
    /// Create a retry config, rejecting a non-growing backoff base.
    pub fn new(max_retries: u32, backoff_base: f64) -> Result<Self, ConfigError> {
        let config = Self {
            max_retries,
            backoff_base,
            jitter: false,
            base_delay_ms: default_base_delay_ms(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Enable full jitter on backoff delays.
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Override the base delay (useful for tests and fast-failing paths).
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Check all knobs are in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backoff_base <= 1.0 || !self.backoff_base.is_finite() {
            return Err(ConfigError::invalid(
                "backoff_base",
                format!("must be a finite float > 1, got {}", self.backoff_base),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Timeout
// ---------------------------------------------------------------------------

/// Configuration for the `Timeout` wrapper.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Deadline for the wrapped execution, in milliseconds.
    pub timeout_ms: u64,
}

impl TimeoutConfig {
    /// Create a timeout config, rejecting a zero deadline.
    pub fn new(timeout_ms: u64) -> Result<Self, ConfigError> {
        let config = Self { timeout_ms };
        config.validate()?;
        Ok(config)
    }

    /// Check all knobs are in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("timeout_ms", "must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Configuration for the `Cache` wrapper.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Time-to-live for each entry, in seconds.
    pub ttl_seconds: f64,
    /// Maximum number of live entries; the oldest entry is evicted on
    /// overflow.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    1024
}

impl CacheConfig {
    /// Create a cache config, rejecting non-positive TTL or zero capacity.
    pub fn new(ttl_seconds: f64, max_entries: usize) -> Result<Self, ConfigError> {
        let config = Self {
            ttl_seconds,
            max_entries,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check all knobs are in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_seconds <= 0.0 || !self.ttl_seconds.is_finite() {
            return Err(ConfigError::invalid(
                "ttl_seconds",
                format!("must be a finite float > 0, got {}", self.ttl_seconds),
            ));
        }
        if self.max_entries == 0 {
            return Err(ConfigError::invalid("max_entries", "must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Adaptive learning
// ---------------------------------------------------------------------------

/// How aggressively the adaptive controller is allowed to act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningMode {
    /// No bookkeeping at all; the wrapper is a transparent passthrough.
    Disabled,
    /// Observe and propose candidates, but never write live parameters.
    Passive,
    /// Apply candidate parameters to live traffic during validation.
    Active,
    /// Like `Active`, with a halved observation requirement.
    Aggressive,
}

/// Configuration for an `Adaptive` wrapper and its controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdaptiveConfig {
    /// Controller behavior mode.
    #[serde(default = "default_learning_mode")]
    pub learning_mode: LearningMode,
    /// Executions observed for a context pattern before a candidate is
    /// proposed.
    #[serde(default = "default_min_observations")]
    pub min_observations_before_learning: u64,
    /// Executions a candidate must accumulate before the promote/reject
    /// decision.
    #[serde(default = "default_validation_window")]
    pub validation_window: u64,
    /// Allowed relative slack before a candidate metric counts as a
    /// regression (0.05 = 5% worse than baseline is tolerated).
    #[serde(default = "default_regression_tolerance")]
    pub regression_tolerance: f64,
    /// Failure rate across learning-eligible executions that trips the
    /// learning circuit breaker.
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,
    /// Consecutive failures that trip the breaker regardless of rate.
    #[serde(default = "default_consecutive_failure_limit")]
    pub consecutive_failure_limit: u32,
    /// How long learning stays suspended after the breaker opens.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_learning_mode() -> LearningMode {
    LearningMode::Passive
}

fn default_min_observations() -> u64 {
    50
}

fn default_validation_window() -> u64 {
    20
}

fn default_regression_tolerance() -> f64 {
    0.05
}

fn default_failure_rate_threshold() -> f64 {
    0.5
}

fn default_consecutive_failure_limit() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    300
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            learning_mode: default_learning_mode(),
            min_observations_before_learning: default_min_observations(),
            validation_window: default_validation_window(),
            regression_tolerance: default_regression_tolerance(),
            failure_rate_threshold: default_failure_rate_threshold(),
            consecutive_failure_limit: default_consecutive_failure_limit(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl AdaptiveConfig {
    /// Check all knobs are in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_observations_before_learning == 0 {
            return Err(ConfigError::invalid(
                "min_observations_before_learning",
                "must be >= 1",
            ));
        }
        if self.validation_window == 0 {
            return Err(ConfigError::invalid("validation_window", "must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.regression_tolerance) {
            return Err(ConfigError::invalid(
                "regression_tolerance",
                format!("must be within [0, 1], got {}", self.regression_tolerance),
            ));
        }
        if !(0.0..=1.0).contains(&self.failure_rate_threshold)
            || self.failure_rate_threshold == 0.0
        {
            return Err(ConfigError::invalid(
                "failure_rate_threshold",
                format!("must be within (0, 1], got {}", self.failure_rate_threshold),
            ));
        }
        if self.consecutive_failure_limit == 0 {
            return Err(ConfigError::invalid(
                "consecutive_failure_limit",
                "must be >= 1",
            ));
        }
        Ok(())
    }

    /// Observation requirement after the mode adjustment.
    ///
    /// Aggressive mode halves the requirement (floor 1).
    pub fn effective_min_observations(&self) -> u64 {
        match self.learning_mode {
            LearningMode::Aggressive => (self.min_observations_before_learning / 2).max(1),
            _ => self.min_observations_before_learning,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_rejects_flat_backoff() {
        assert!(RetryConfig::new(3, 1.0).is_err());
        assert!(RetryConfig::new(3, 0.5).is_err());
        assert!(RetryConfig::new(3, f64::NAN).is_err());
        assert!(RetryConfig::new(3, 2.0).is_ok());
    }

    #[test]
    fn retry_serde_defaults() {
        let config: RetryConfig = serde_json::from_str(r#"{"max_retries": 2}"#).unwrap();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.backoff_base, 2.0);
        assert_eq!(config.base_delay_ms, 100);
        assert!(!config.jitter);
    }

    #[test]
    fn timeout_rejects_zero() {
        assert!(TimeoutConfig::new(0).is_err());
        assert_eq!(TimeoutConfig::new(250).unwrap().timeout_ms, 250);
    }

    #[test]
    fn cache_rejects_bad_knobs() {
        assert!(CacheConfig::new(0.0, 10).is_err());
        assert!(CacheConfig::new(-1.0, 10).is_err());
        assert!(CacheConfig::new(30.0, 0).is_err());
        assert!(CacheConfig::new(30.0, 10).is_ok());
    }

    #[test]
    fn adaptive_defaults_are_valid() {
        let config = AdaptiveConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.learning_mode, LearningMode::Passive);
        assert_eq!(config.failure_rate_threshold, 0.5);
    }

    #[test]
    fn adaptive_rejects_out_of_range() {
        let config = AdaptiveConfig {
            failure_rate_threshold: 1.5,
            ..AdaptiveConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AdaptiveConfig {
            min_observations_before_learning: 0,
            ..AdaptiveConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn aggressive_mode_halves_observation_requirement() {
        let config = AdaptiveConfig {
            learning_mode: LearningMode::Aggressive,
            min_observations_before_learning: 50,
            ..AdaptiveConfig::default()
        };
        assert_eq!(config.effective_min_observations(), 25);

        let config = AdaptiveConfig {
            learning_mode: LearningMode::Aggressive,
            min_observations_before_learning: 1,
            ..AdaptiveConfig::default()
        };
        assert_eq!(config.effective_min_observations(), 1);
    }

    #[test]
    fn learning_mode_serde_snake_case() {
        let mode: LearningMode = serde_json::from_str(r#""aggressive""#).unwrap();
        assert_eq!(mode, LearningMode::Aggressive);
        assert_eq!(
            serde_json::to_string(&LearningMode::Disabled).unwrap(),
            r#""disabled""#
        );
    }
}
