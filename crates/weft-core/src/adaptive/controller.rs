//! The adaptive controller: strategy lifecycle management per context
//! pattern.
//!
//! Per `(wrapper, context_pattern)` the controller runs the state machine
//! `Observing -> Candidate -> Validating -> {Promoted | Rejected}`, with
//! promoted strategies demoted back to `Observing` when later metrics
//! regress. A baseline strategy always exists per pattern and is never
//! deleted. Candidate parameters are derived from observed telemetry:
//! cache TTL from the reuse interval, retry budget from the transient
//! failure rate, timeout from the latency distribution.
//!
//! The controller is the single writer to the strategy registry and to the
//! wrapper's `TunableParams` handle; the execution path only reads copies.
//! Every fallible path returns a `LearningError` for the adaptive wrapper
//! to log -- nothing here can affect a caller's functional result.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use weft_types::config::{AdaptiveConfig, LearningMode};
use weft_types::error::{ConfigError, LearningError};
use weft_types::strategy::{
    derive_context_pattern, LearningPhase, Strategy, StrategyMetrics, StrategyParameters,
};

use crate::adaptive::breaker::LearningBreaker;
use crate::resilience::params::TunableParams;

/// Pattern used when context metadata carries no derivable pattern.
const FALLBACK_PATTERN: &str = "default";

// ---------------------------------------------------------------------------
// Per-pattern state
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct PatternState {
    phase: LearningPhase,
    baseline: Strategy,
    candidate: Option<Strategy>,
    last_execution: Option<Instant>,
    reuse_interval_mean_ms: f64,
    reuse_samples: u64,
    transient_failures: u64,
    observed_since_reset: u64,
    validation_count: u64,
}

impl PatternState {
    fn new(pattern: &str, baseline_parameters: StrategyParameters) -> Self {
        Self {
            phase: LearningPhase::Observing,
            baseline: Strategy::baseline(pattern, baseline_parameters),
            candidate: None,
            last_execution: None,
            reuse_interval_mean_ms: 0.0,
            reuse_samples: 0,
            transient_failures: 0,
            observed_since_reset: 0,
            validation_count: 0,
        }
    }

    /// Fold one observation into the baseline telemetry.
    fn observe(&mut self, success: bool, latency_ms: f64, transient_failure: bool) {
        if let Some(last) = self.last_execution {
            let interval_ms = last.elapsed().as_secs_f64() * 1_000.0;
            self.reuse_samples += 1;
            self.reuse_interval_mean_ms +=
                (interval_ms - self.reuse_interval_mean_ms) / self.reuse_samples as f64;
        }
        self.last_execution = Some(Instant::now());

        self.baseline.metrics.record(success, latency_ms);
        self.baseline.usage_count += 1;
        self.observed_since_reset += 1;
        if transient_failure {
            self.transient_failures += 1;
        }
    }

    /// Discard the candidate and return to observation.
    fn reset_to_observing(&mut self) {
        self.phase = LearningPhase::Observing;
        self.candidate = None;
        self.observed_since_reset = 0;
        self.validation_count = 0;
        self.transient_failures = 0;
    }
}

// ---------------------------------------------------------------------------
// AdaptiveController
// ---------------------------------------------------------------------------

/// Learns and applies resilience parameters per context pattern.
pub struct AdaptiveController {
    config: AdaptiveConfig,
    params: TunableParams,
    baseline_parameters: StrategyParameters,
    registry: DashMap<String, PatternState>,
    breaker: Mutex<LearningBreaker>,
}

impl AdaptiveController {
    /// Create a controller writing through the given parameter handle.
    ///
    /// The handle's current contents become the immutable baseline.
    pub fn new(config: AdaptiveConfig, params: TunableParams) -> Result<Self, ConfigError> {
        config.validate()?;
        let baseline_parameters = params.snapshot();
        let breaker = LearningBreaker::new(
            config.failure_rate_threshold,
            config.consecutive_failure_limit,
            Duration::from_secs(config.cooldown_secs),
        );
        Ok(Self {
            config,
            params,
            baseline_parameters,
            registry: DashMap::new(),
            breaker: Mutex::new(breaker),
        })
    }

    /// Feed one execution outcome into the learning loop.
    ///
    /// Returns a `LearningError` for the wrapper to log when learning is
    /// suspended, a candidate is rejected, or a promoted strategy is
    /// demoted. Never touches the functional result.
    pub fn record_outcome(
        &self,
        metadata: &BTreeMap<String, String>,
        success: bool,
        latency_ms: f64,
        transient_failure: bool,
    ) -> Result<(), LearningError> {
        if self.config.learning_mode == LearningMode::Disabled {
            return Ok(());
        }

        // Breaker first: a suspended learner stays on baseline.
        {
            let mut breaker = match self.breaker.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            breaker.record(success);
            if !breaker.learning_allowed() {
                self.params.store(self.baseline_parameters);
                return Err(LearningError::CircuitBreakerOpen {
                    failure_rate: breaker.failure_rate(),
                    cooldown_secs: breaker.cooldown_remaining().as_secs(),
                });
            }
        }

        let pattern = match derive_context_pattern(metadata) {
            Ok(pattern) => pattern,
            Err(err) => {
                tracing::debug!(error = %err, "attributing execution to fallback pattern");
                FALLBACK_PATTERN.to_string()
            }
        };

        let mut state = self
            .registry
            .entry(pattern.clone())
            .or_insert_with(|| PatternState::new(&pattern, self.baseline_parameters));

        self.advance(&mut state, success, latency_ms, transient_failure)
    }

    /// Look up a strategy by name across every context pattern.
    ///
    /// A miss is a developer-facing error listing the available names,
    /// never a silent default.
    pub fn strategy(&self, name: &str) -> Result<Strategy, LearningError> {
        let mut available = Vec::new();
        for entry in self.registry.iter() {
            let state = entry.value();
            if state.baseline.name == name {
                return Ok(state.baseline.clone());
            }
            available.push(state.baseline.name.clone());
            if let Some(candidate) = &state.candidate {
                if candidate.name == name {
                    return Ok(candidate.clone());
                }
                available.push(candidate.name.clone());
            }
        }
        available.sort();
        available.dedup();
        Err(LearningError::StrategyNotFound {
            name: name.to_string(),
            available,
        })
    }

    /// Copies of every known strategy (baselines and candidates).
    pub fn strategies(&self) -> Vec<Strategy> {
        let mut all = Vec::new();
        for entry in self.registry.iter() {
            all.push(entry.value().baseline.clone());
            if let Some(candidate) = &entry.value().candidate {
                all.push(candidate.clone());
            }
        }
        all
    }

    /// Lifecycle phase for a context pattern, if observed yet.
    pub fn phase(&self, pattern: &str) -> Option<LearningPhase> {
        self.registry.get(pattern).map(|state| state.phase)
    }

    /// The parameters the wrapped primitive will use next.
    pub fn active_parameters(&self) -> StrategyParameters {
        self.params.snapshot()
    }

    /// Whether the learning breaker currently blocks learning.
    pub fn learning_suspended(&self) -> bool {
        let mut breaker = match self.breaker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        !breaker.learning_allowed()
    }

    /// Drive the per-pattern state machine with one outcome.
    fn advance(
        &self,
        state: &mut PatternState,
        success: bool,
        latency_ms: f64,
        transient_failure: bool,
    ) -> Result<(), LearningError> {
        match state.phase {
            LearningPhase::Rejected => {
                // A rejected candidate is gone; resume observation with
                // this execution.
                state.reset_to_observing();
                self.advance(state, success, latency_ms, transient_failure)
            }
            LearningPhase::Observing => {
                state.observe(success, latency_ms, transient_failure);

                if state.observed_since_reset >= self.config.effective_min_observations() {
                    let derived = self.derive_candidate_parameters(state);
                    let candidate =
                        Strategy::candidate(state.baseline.context_pattern.as_str(), derived);
                    tracing::info!(
                        pattern = state.baseline.context_pattern.as_str(),
                        candidate = candidate.name.as_str(),
                        "proposing candidate strategy"
                    );
                    state.candidate = Some(candidate);
                    state.phase = LearningPhase::Candidate;
                    state.validation_count = 0;
                    if self.writes_live_parameters() {
                        self.params.store(derived);
                    }
                }
                Ok(())
            }
            LearningPhase::Candidate | LearningPhase::Validating => {
                state.phase = LearningPhase::Validating;
                let window = self.config.validation_window;
                let baseline_metrics = state.baseline.metrics;
                let Some(candidate) = state.candidate.as_mut() else {
                    // Candidate vanished; not a state the machine can
                    // produce, but recover rather than corrupt anything.
                    state.reset_to_observing();
                    return Err(LearningError::StrategyValidation {
                        strategy: format!("candidate:{}", state.baseline.context_pattern),
                        reason: "candidate missing during validation".to_string(),
                    });
                };
                candidate.metrics.record(success, latency_ms);
                candidate.usage_count += 1;
                state.validation_count += 1;

                if state.validation_count < window {
                    return Ok(());
                }

                match compare_against_baseline(
                    &baseline_metrics,
                    &candidate.metrics,
                    self.config.regression_tolerance,
                ) {
                    Ok(()) => {
                        candidate.validated = true;
                        let promoted_parameters = candidate.parameters;
                        state.phase = LearningPhase::Promoted;
                        tracing::info!(
                            pattern = state.baseline.context_pattern.as_str(),
                            "candidate promoted to active strategy"
                        );
                        if self.config.learning_mode != LearningMode::Passive {
                            self.params.store(promoted_parameters);
                        }
                        Ok(())
                    }
                    Err(err) => {
                        state.phase = LearningPhase::Rejected;
                        state.candidate = None;
                        self.params.store(self.baseline_parameters);
                        Err(err)
                    }
                }
            }
            LearningPhase::Promoted => {
                let baseline_metrics = state.baseline.metrics;
                let window = self.config.validation_window;
                let Some(active) = state.candidate.as_mut() else {
                    state.reset_to_observing();
                    return Err(LearningError::StrategyValidation {
                        strategy: format!("candidate:{}", state.baseline.context_pattern),
                        reason: "promoted strategy missing".to_string(),
                    });
                };
                active.metrics.record(success, latency_ms);
                active.usage_count += 1;

                if active.metrics.total_executions >= window {
                    if let Err(err) = compare_against_baseline(
                        &baseline_metrics,
                        &active.metrics,
                        self.config.regression_tolerance,
                    ) {
                        tracing::warn!(
                            pattern = state.baseline.context_pattern.as_str(),
                            error = %err,
                            "promoted strategy regressed, demoting to baseline"
                        );
                        state.reset_to_observing();
                        self.params.store(self.baseline_parameters);
                        return Err(err);
                    }
                }
                Ok(())
            }
        }
    }

    /// Whether this mode applies candidate parameters to live traffic.
    fn writes_live_parameters(&self) -> bool {
        matches!(
            self.config.learning_mode,
            LearningMode::Active | LearningMode::Aggressive
        )
    }

    /// Derive candidate parameters from observed telemetry.
    fn derive_candidate_parameters(&self, state: &PatternState) -> StrategyParameters {
        let baseline = &self.baseline_parameters;

        // TTL: cover the typical reuse interval with headroom.
        let ttl_seconds = if state.reuse_samples > 0 {
            (2.0 * state.reuse_interval_mean_ms / 1_000.0).clamp(1.0, 3_600.0)
        } else {
            baseline.ttl_seconds
        };

        // Retries: spend attempts in proportion to the transient-failure rate.
        let observed = state.baseline.usage_count.max(1) as f64;
        let transient_rate = state.transient_failures as f64 / observed;
        let max_retries = if transient_rate < 0.01 {
            1
        } else if transient_rate < 0.05 {
            2
        } else if transient_rate < 0.2 {
            3
        } else {
            4
        };

        // Backoff: spread retries further apart when transients cluster.
        let backoff_base = if transient_rate < 0.05 {
            1.5
        } else if transient_rate < 0.2 {
            2.0
        } else {
            3.0
        };

        // Timeout: generous headroom over the observed average latency.
        let average_latency = state.baseline.metrics.average_latency_ms;
        let timeout_ms = if average_latency > 0.0 {
            let ceiling = (baseline.timeout_ms * 2).max(100);
            (average_latency * 4.0).clamp(100.0, ceiling as f64) as u64
        } else {
            baseline.timeout_ms
        };

        StrategyParameters {
            ttl_seconds,
            max_retries,
            backoff_base,
            timeout_ms,
        }
    }
}

impl std::fmt::Debug for AdaptiveController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveController")
            .field("mode", &self.config.learning_mode)
            .field("patterns", &self.registry.len())
            .finish()
    }
}

/// Reject candidates that regress success rate or latency past tolerance.
fn compare_against_baseline(
    baseline: &StrategyMetrics,
    candidate: &StrategyMetrics,
    tolerance: f64,
) -> Result<(), LearningError> {
    let baseline_rate = baseline.success_rate();
    let candidate_rate = candidate.success_rate();
    if candidate_rate < baseline_rate * (1.0 - tolerance) {
        return Err(LearningError::PerformanceRegression {
            metric: "success_rate".to_string(),
            baseline: baseline_rate,
            candidate: candidate_rate,
        });
    }

    if baseline.average_latency_ms > 0.0
        && candidate.average_latency_ms > baseline.average_latency_ms * (1.0 + tolerance)
    {
        return Err(LearningError::PerformanceRegression {
            metric: "average_latency_ms".to_string(),
            baseline: baseline.average_latency_ms,
            candidate: candidate.average_latency_ms,
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
