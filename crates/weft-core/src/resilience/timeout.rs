//! Timeout wrapper: races the wrapped execution against a deadline.
//!
//! On expiry the wrapper fails with `EngineError::Timeout` and cancels the
//! subtree's cancellation token. Cancellation is cooperative: work that is
//! directly awaited is discarded with the raced future, while spawned
//! descendants (parallel branches) observe the cancelled token at their
//! next suspension point and wind down on their own.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use weft_observe::MetricsCollector;
use weft_types::config::TimeoutConfig;
use weft_types::context::ExecutionContext;
use weft_types::error::{ConfigError, EngineError};
use weft_types::strategy::StrategyParameters;

use crate::primitive::{BoxPrimitive, Primitive};
use crate::resilience::params::TunableParams;

/// Wraps one primitive with a deadline.
pub struct Timeout {
    name: String,
    inner: BoxPrimitive,
    params: TunableParams,
    collector: Arc<MetricsCollector>,
}

impl Timeout {
    /// Create a timeout wrapper from validated configuration.
    pub fn new(
        name: impl Into<String>,
        inner: BoxPrimitive,
        config: TimeoutConfig,
        collector: Arc<MetricsCollector>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let params = TunableParams::new(StrategyParameters {
            timeout_ms: config.timeout_ms,
            ..StrategyParameters::default()
        });
        Ok(Self {
            name: name.into(),
            inner,
            params,
            collector,
        })
    }

    /// The tunable-parameter handle, for wiring into an adaptive wrapper.
    pub fn params_handle(&self) -> TunableParams {
        self.params.clone()
    }
}

impl Primitive for Timeout {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "timeout"
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EngineError> {
        let timeout_ms = self.params.snapshot().timeout_ms;
        let timer = self.collector.begin(&self.name, self.kind());

        // Scope the subtree to a child token so expiry reaches spawned
        // descendants without cancelling anything outside this wrapper.
        let child_token = ctx.cancellation.child_token();
        let previous = std::mem::replace(&mut ctx.cancellation, child_token.clone());

        let raced = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.inner.execute(input, ctx),
        )
        .await;

        ctx.cancellation = previous;

        match raced {
            Ok(result) => {
                timer.complete(result.is_ok());
                result
            }
            Err(_elapsed) => {
                child_token.cancel();
                ctx.checkpoint("timeout.expired");
                tracing::warn!(
                    wrapper = self.name.as_str(),
                    timeout_ms,
                    "deadline exceeded, discarding in-flight work"
                );
                timer.complete(false);
                Err(EngineError::Timeout { timeout_ms })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
