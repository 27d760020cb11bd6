//! Instrumentation wrapper: metrics plus sampled trace emission for any
//! primitive.
//!
//! Metrics are recorded unconditionally (in-flight gauge, outcome, duration).
//! Trace emission is gated by the sampler: the head decision is taken when
//! execution starts, and a tail upgrade forces emission for errors and slow
//! calls regardless of the head decision.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use weft_observe::{MetricsCollector, Sampler};
use weft_types::context::ExecutionContext;
use weft_types::error::EngineError;

use crate::primitive::{BoxPrimitive, Primitive};

/// Decorates a primitive with metrics and sampled tracing.
pub struct Instrumented {
    name: String,
    inner: BoxPrimitive,
    collector: Arc<MetricsCollector>,
    sampler: Arc<Sampler>,
}

impl Instrumented {
    /// Wrap a primitive under an instrumentation name.
    pub fn new(
        name: impl Into<String>,
        inner: BoxPrimitive,
        collector: Arc<MetricsCollector>,
        sampler: Arc<Sampler>,
    ) -> Self {
        Self {
            name: name.into(),
            inner,
            collector,
            sampler,
        }
    }
}

impl Primitive for Instrumented {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "instrumented"
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EngineError> {
        // Head decision happens before the outcome is known.
        let head_sampled = self.sampler.head_decision(&ctx.correlation_id);

        let timer = self.collector.begin(&self.name, self.inner.kind());
        let started = Instant::now();

        let result = self.inner.execute(input, ctx).await;

        let duration = started.elapsed();
        let duration_ms = duration.as_millis() as u64;
        timer.complete_with_duration(result.is_ok(), duration);

        if self
            .sampler
            .should_emit(head_sampled, result.is_err(), duration_ms)
        {
            match &result {
                Ok(_) => tracing::info!(
                    primitive = self.name.as_str(),
                    trace_id = ctx.trace.trace_id.as_str(),
                    span_id = ctx.trace.span_id.as_str(),
                    correlation_id = ctx.correlation_id.as_str(),
                    duration_ms,
                    head_sampled,
                    outcome = "success",
                    "traced execution"
                ),
                Err(err) => tracing::info!(
                    primitive = self.name.as_str(),
                    trace_id = ctx.trace.trace_id.as_str(),
                    span_id = ctx.trace.span_id.as_str(),
                    correlation_id = ctx.correlation_id.as_str(),
                    duration_ms,
                    head_sampled,
                    outcome = "failure",
                    error = %err,
                    "traced execution"
                ),
            }
        }

        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
