//! The `Adaptive` wrapper: feeds execution outcomes into the learning
//! controller without ever touching the functional result.
//!
//! Wrap a tunable resilience wrapper and hand its `params_handle()` to the
//! controller:
//!
//! ```ignore
//! let retry = Retry::new("fetch-retry", leaf, retry_config, collector.clone())?;
//! let handle = retry.params_handle();
//! let adaptive = Adaptive::new("fetch-adaptive", retry.boxed(), adaptive_config, handle, collector)?;
//! ```
//!
//! Every learning failure -- breaker open, rejected candidate, demotion,
//! pattern extraction trouble -- is logged and swallowed here. Callers see
//! only the wrapped primitive's own result.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use weft_observe::MetricsCollector;
use weft_types::config::AdaptiveConfig;
use weft_types::context::ExecutionContext;
use weft_types::error::{ConfigError, EngineError};

use crate::adaptive::controller::AdaptiveController;
use crate::primitive::{BoxPrimitive, Primitive};
use crate::resilience::params::TunableParams;

/// Wraps a primitive with adaptive parameter learning.
pub struct Adaptive {
    name: String,
    inner: BoxPrimitive,
    controller: Arc<AdaptiveController>,
    collector: Arc<MetricsCollector>,
}

impl Adaptive {
    /// Create an adaptive wrapper around `inner`, learning through the
    /// given parameter handle (obtained from the tunable wrapper being
    /// controlled).
    pub fn new(
        name: impl Into<String>,
        inner: BoxPrimitive,
        config: AdaptiveConfig,
        params: TunableParams,
        collector: Arc<MetricsCollector>,
    ) -> Result<Self, ConfigError> {
        let controller = Arc::new(AdaptiveController::new(config, params)?);
        Ok(Self {
            name: name.into(),
            inner,
            controller,
            collector,
        })
    }

    /// The controller, for strategy inspection and metrics exposition.
    pub fn controller(&self) -> Arc<AdaptiveController> {
        Arc::clone(&self.controller)
    }
}

impl Primitive for Adaptive {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "adaptive"
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EngineError> {
        let timer = self.collector.begin(&self.name, self.kind());
        let started = Instant::now();

        let result = self.inner.execute(input, ctx).await;

        let latency = started.elapsed();
        timer.complete_with_duration(result.is_ok(), latency);

        let transient_failure = matches!(&result, Err(err) if err.is_retryable());
        if let Err(learning_err) = self.controller.record_outcome(
            &ctx.metadata,
            result.is_ok(),
            latency.as_secs_f64() * 1_000.0,
            transient_failure,
        ) {
            // Learning trouble must never surface to the caller.
            tracing::warn!(
                wrapper = self.name.as_str(),
                error = %learning_err,
                "learning subsystem error, keeping last-known-good strategy"
            );
        }

        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
