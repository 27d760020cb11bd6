//! Circuit breaker guarding the learning subsystem.
//!
//! Learning is risky relative to the execution path it observes, so it gets
//! its own breaker: when the failure rate across learning-eligible
//! executions crosses a threshold, or consecutive failures pile up, all
//! learning is suspended (strategies stay on baseline) for a cooldown
//! period. After the cooldown a half-open probe window decides whether
//! learning resumes or the breaker re-opens.

use std::time::{Duration, Instant};

/// The breaker never trips on failure rate before this many samples, so a
/// single early failure cannot suspend learning.
const MIN_RATE_SAMPLES: u64 = 10;

/// Breaker state.
#[derive(Debug, Clone)]
pub enum BreakerState {
    /// Learning allowed. Tracks consecutive failures toward the limit.
    Closed { consecutive_failures: u32 },
    /// Learning suspended. Will probe after the cooldown elapses.
    Open { opened_at: Instant, cooldown: Duration },
    /// Probing: learning allowed, one failure re-opens.
    HalfOpen,
}

/// Failure-rate circuit breaker for the learning loop.
#[derive(Debug)]
pub struct LearningBreaker {
    state: BreakerState,
    failure_rate_threshold: f64,
    consecutive_failure_limit: u32,
    cooldown: Duration,
    window_total: u64,
    window_failures: u64,
}

impl LearningBreaker {
    /// Create a breaker from controller configuration.
    pub fn new(
        failure_rate_threshold: f64,
        consecutive_failure_limit: u32,
        cooldown: Duration,
    ) -> Self {
        Self {
            state: BreakerState::Closed {
                consecutive_failures: 0,
            },
            failure_rate_threshold,
            consecutive_failure_limit,
            cooldown,
            window_total: 0,
            window_failures: 0,
        }
    }

    /// Whether learning is currently allowed.
    ///
    /// Transitions `Open -> HalfOpen` once the cooldown has elapsed.
    pub fn learning_allowed(&mut self) -> bool {
        match &self.state {
            BreakerState::Closed { .. } | BreakerState::HalfOpen => true,
            BreakerState::Open {
                opened_at,
                cooldown,
            } => {
                if opened_at.elapsed() >= *cooldown {
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Fold one learning-eligible execution outcome into the breaker.
    pub fn record(&mut self, success: bool) {
        self.window_total += 1;
        if !success {
            self.window_failures += 1;
        }

        match &self.state {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                if success {
                    self.state = BreakerState::Closed {
                        consecutive_failures: 0,
                    };
                    return;
                }
                let streak = consecutive_failures + 1;
                if streak >= self.consecutive_failure_limit || self.rate_tripped() {
                    self.open();
                } else {
                    self.state = BreakerState::Closed {
                        consecutive_failures: streak,
                    };
                }
            }
            BreakerState::HalfOpen => {
                if success {
                    // Probe passed: close and start a fresh window.
                    self.state = BreakerState::Closed {
                        consecutive_failures: 0,
                    };
                    self.window_total = 0;
                    self.window_failures = 0;
                } else {
                    self.open();
                }
            }
            BreakerState::Open { .. } => {}
        }
    }

    /// Failure rate over the current window.
    pub fn failure_rate(&self) -> f64 {
        if self.window_total == 0 {
            0.0
        } else {
            self.window_failures as f64 / self.window_total as f64
        }
    }

    /// Remaining cooldown, zero when not open.
    pub fn cooldown_remaining(&self) -> Duration {
        match &self.state {
            BreakerState::Open {
                opened_at,
                cooldown,
            } => cooldown.saturating_sub(opened_at.elapsed()),
            _ => Duration::ZERO,
        }
    }

    /// Current state, for introspection.
    pub fn state(&self) -> &BreakerState {
        &self.state
    }

    fn rate_tripped(&self) -> bool {
        self.window_total >= MIN_RATE_SAMPLES
            && self.failure_rate() > self.failure_rate_threshold
    }

    fn open(&mut self) {
        tracing::warn!(
            failure_rate = self.failure_rate(),
            cooldown_secs = self.cooldown.as_secs(),
            "learning circuit breaker opened"
        );
        self.state = BreakerState::Open {
            opened_at: Instant::now(),
            cooldown: self.cooldown,
        };
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
