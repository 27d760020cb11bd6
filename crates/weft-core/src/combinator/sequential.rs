//! Sequential combinator: an ordered pipe of primitives.
//!
//! Each step's output becomes the next step's input. A failure at step *i*
//! aborts the remaining steps and propagates unchanged. Start/end
//! checkpoints are written per step for diagnostics.

use std::sync::Arc;

use serde_json::Value;

use weft_observe::MetricsCollector;
use weft_types::context::ExecutionContext;
use weft_types::error::{ConfigError, EngineError};

use crate::primitive::{BoxPrimitive, Primitive};

/// Executes an ordered list of primitives, piping outputs forward.
pub struct Sequential {
    name: String,
    steps: Vec<BoxPrimitive>,
    collector: Arc<MetricsCollector>,
}

impl Sequential {
    /// Create a sequential pipe. Rejects an empty step list.
    pub fn new(
        name: impl Into<String>,
        steps: Vec<BoxPrimitive>,
        collector: Arc<MetricsCollector>,
    ) -> Result<Self, ConfigError> {
        if steps.is_empty() {
            return Err(ConfigError::Empty {
                what: "sequential steps".to_string(),
            });
        }
        Ok(Self {
            name: name.into(),
            steps,
            collector,
        })
    }

    /// Number of steps in the pipe.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the pipe has no steps (never true after construction).
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Primitive for Sequential {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "sequential"
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EngineError> {
        let timer = self.collector.begin(&self.name, self.kind());
        let mut value = input;

        for (i, step) in self.steps.iter().enumerate() {
            ctx.checkpoint(format!("sequential.step_{i}.start"));

            match step.execute(value, ctx).await {
                Ok(output) => {
                    ctx.checkpoint(format!("sequential.step_{i}.end"));
                    value = output;
                }
                Err(err) => {
                    tracing::debug!(
                        pipe = self.name.as_str(),
                        step = i,
                        error = %err,
                        "sequential step failed, aborting remaining steps"
                    );
                    timer.complete(false);
                    return Err(err);
                }
            }
        }

        timer.complete(true);
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{FnPrimitive, PrimitiveExt, PrimitiveFuture};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn collector() -> Arc<MetricsCollector> {
        Arc::new(MetricsCollector::with_defaults())
    }

    fn add_one(name: &str) -> BoxPrimitive {
        FnPrimitive::new(name, |input: Value, _ctx: &mut ExecutionContext| {
            Box::pin(async move { Ok(json!(input.as_i64().unwrap_or(0) + 1)) })
                as PrimitiveFuture<'_>
        })
        .boxed()
    }

    fn failing(name: &str) -> BoxPrimitive {
        FnPrimitive::new(name, |_input: Value, _ctx: &mut ExecutionContext| {
            Box::pin(async move { Err(EngineError::non_retryable("boom")) })
                as PrimitiveFuture<'_>
        })
        .boxed()
    }

    fn counting(name: &str, counter: Arc<AtomicU32>) -> BoxPrimitive {
        FnPrimitive::new(name, move |input: Value, _ctx: &mut ExecutionContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(input) }) as PrimitiveFuture<'_>
        })
        .boxed()
    }

    #[tokio::test]
    async fn pipes_outputs_in_order() {
        let pipe = Sequential::new(
            "add-three",
            vec![add_one("a"), add_one("b"), add_one("c")],
            collector(),
        )
        .unwrap();

        let mut ctx = ExecutionContext::new("req-1");
        let out = pipe.execute(json!(0), &mut ctx).await.unwrap();
        assert_eq!(out, json!(3));
    }

    #[tokio::test]
    async fn writes_start_end_checkpoints_per_step() {
        let pipe = Sequential::new("pipe", vec![add_one("a"), add_one("b")], collector()).unwrap();

        let mut ctx = ExecutionContext::new("req-2");
        pipe.execute(json!(0), &mut ctx).await.unwrap();
        assert_eq!(
            ctx.checkpoint_names(),
            vec![
                "sequential.step_0.start",
                "sequential.step_0.end",
                "sequential.step_1.start",
                "sequential.step_1.end",
            ]
        );
    }

    #[tokio::test]
    async fn failure_aborts_remaining_steps() {
        let ran = Arc::new(AtomicU32::new(0));
        let pipe = Sequential::new(
            "pipe",
            vec![add_one("a"), failing("b"), counting("c", Arc::clone(&ran))],
            collector(),
        )
        .unwrap();

        let mut ctx = ExecutionContext::new("req-3");
        let err = pipe.execute(json!(0), &mut ctx).await.unwrap_err();
        assert_eq!(err, EngineError::non_retryable("boom"));
        assert_eq!(ran.load(Ordering::SeqCst), 0, "step after failure must not run");
        // The failing step has a start checkpoint but no end.
        assert!(ctx
            .checkpoint_names()
            .contains(&"sequential.step_1.start"));
        assert!(!ctx.checkpoint_names().contains(&"sequential.step_1.end"));
    }

    #[tokio::test]
    async fn rejects_empty_steps() {
        assert!(matches!(
            Sequential::new("empty", vec![], collector()),
            Err(ConfigError::Empty { .. })
        ));
    }

    #[tokio::test]
    async fn records_outcome_to_collector() {
        let collector = collector();
        let pipe =
            Sequential::new("pipe", vec![add_one("a")], Arc::clone(&collector)).unwrap();

        let mut ctx = ExecutionContext::new("req-4");
        pipe.execute(json!(0), &mut ctx).await.unwrap();

        let snapshots = collector.export();
        let pipe_metrics = snapshots
            .iter()
            .find(|s| s.labels.primitive_name == "pipe")
            .unwrap();
        assert_eq!(pipe_metrics.executions, 1);
        assert_eq!(pipe_metrics.successes, 1);
        assert_eq!(pipe_metrics.labels.primitive_type, "sequential");
    }
}
