//! Head and tail trace sampling.
//!
//! The head decision is made when a traced operation starts, by consistent
//! hashing of the correlation id against the sampling rate -- the same id
//! always gets the same decision. Independently, a tail upgrade forces the
//! trace to be kept when the operation errors or runs slow. Sampling gates
//! trace emission only; metrics are always recorded.

use sha2::{Digest, Sha256};

use weft_types::error::ConfigError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Sampler configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    /// Fraction of correlation ids head-sampled, in [0, 1].
    pub sampling_rate: f64,
    /// Force sampling when the operation errors.
    pub always_sample_errors: bool,
    /// Force sampling when the operation exceeds the slow-call threshold.
    pub always_sample_slow: bool,
    /// Slow-call threshold in milliseconds.
    pub slow_call_threshold_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 0.1,
            always_sample_errors: true,
            always_sample_slow: true,
            slow_call_threshold_ms: 5_000,
        }
    }
}

impl SamplerConfig {
    /// Check the sampling rate is a valid fraction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.sampling_rate) || !self.sampling_rate.is_finite() {
            return Err(ConfigError::invalid(
                "sampling_rate",
                format!("must be within [0, 1], got {}", self.sampling_rate),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------------

/// Consistent head sampler with error/latency tail upgrades.
#[derive(Debug, Clone)]
pub struct Sampler {
    config: SamplerConfig,
}

impl Sampler {
    /// Create a sampler from validated configuration.
    pub fn new(config: SamplerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create a sampler with default configuration.
    pub fn with_defaults() -> Self {
        Self {
            config: SamplerConfig::default(),
        }
    }

    /// The configuration this sampler was built with.
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Head decision for a correlation id.
    ///
    /// Hashes the id into the unit interval and compares against the
    /// sampling rate, so repeated calls with the same id always agree.
    pub fn head_decision(&self, correlation_id: &str) -> bool {
        if self.config.sampling_rate >= 1.0 {
            return true;
        }
        if self.config.sampling_rate <= 0.0 {
            return false;
        }
        hash_to_unit(correlation_id) < self.config.sampling_rate
    }

    /// Tail upgrade: force sampling after the fact for errors and slow
    /// calls, per configuration.
    pub fn tail_upgrade(&self, errored: bool, duration_ms: u64) -> bool {
        (self.config.always_sample_errors && errored)
            || (self.config.always_sample_slow
                && duration_ms >= self.config.slow_call_threshold_ms)
    }

    /// Final keep/drop decision for trace emission.
    pub fn should_emit(&self, head: bool, errored: bool, duration_ms: u64) -> bool {
        head || self.tail_upgrade(errored, duration_ms)
    }
}

/// Map a correlation id into [0, 1) deterministically.
fn hash_to_unit(correlation_id: &str) -> f64 {
    let digest = Sha256::digest(correlation_id.as_bytes());
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(word) as f64 / (u64::MAX as f64 + 1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_decision_is_consistent() {
        let sampler = Sampler::new(SamplerConfig {
            sampling_rate: 0.5,
            ..SamplerConfig::default()
        })
        .unwrap();

        let first = sampler.head_decision("req-abc-123");
        for _ in 0..5 {
            assert_eq!(sampler.head_decision("req-abc-123"), first);
        }
    }

    #[test]
    fn rate_extremes() {
        let always = Sampler::new(SamplerConfig {
            sampling_rate: 1.0,
            ..SamplerConfig::default()
        })
        .unwrap();
        let never = Sampler::new(SamplerConfig {
            sampling_rate: 0.0,
            ..SamplerConfig::default()
        })
        .unwrap();

        for id in ["a", "b", "c", "d"] {
            assert!(always.head_decision(id));
            assert!(!never.head_decision(id));
        }
    }

    #[test]
    fn rate_roughly_respected() {
        let sampler = Sampler::new(SamplerConfig {
            sampling_rate: 0.2,
            ..SamplerConfig::default()
        })
        .unwrap();

        let sampled = (0..10_000)
            .filter(|i| sampler.head_decision(&format!("correlation-{i}")))
            .count();
        // 20% +- a generous margin for the hash distribution.
        assert!((1_500..2_500).contains(&sampled), "sampled {sampled}");
    }

    #[test]
    fn tail_upgrade_on_error() {
        let sampler = Sampler::with_defaults();
        assert!(sampler.should_emit(false, true, 1));
        assert!(!sampler.should_emit(false, false, 1));
    }

    #[test]
    fn tail_upgrade_on_slow_call() {
        let sampler = Sampler::new(SamplerConfig {
            sampling_rate: 0.0,
            always_sample_errors: false,
            always_sample_slow: true,
            slow_call_threshold_ms: 100,
        })
        .unwrap();
        assert!(sampler.should_emit(false, false, 150));
        assert!(!sampler.should_emit(false, false, 50));
    }

    #[test]
    fn tail_upgrades_can_be_disabled() {
        let sampler = Sampler::new(SamplerConfig {
            sampling_rate: 0.0,
            always_sample_errors: false,
            always_sample_slow: false,
            slow_call_threshold_ms: 100,
        })
        .unwrap();
        assert!(!sampler.should_emit(false, true, 10_000));
    }

    #[test]
    fn rejects_invalid_rate() {
        assert!(Sampler::new(SamplerConfig {
            sampling_rate: 1.5,
            ..SamplerConfig::default()
        })
        .is_err());
        assert!(Sampler::new(SamplerConfig {
            sampling_rate: -0.1,
            ..SamplerConfig::default()
        })
        .is_err());
    }
}
