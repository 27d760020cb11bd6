//! Conditional combinator: predicate-gated branching.
//!
//! Evaluates a fallible predicate over `(input, ctx)`. True runs the
//! then-branch, false runs the else-branch when present, otherwise the
//! input passes through unchanged with an explicit checkpoint. Predicate
//! failures propagate as errors, never swallowed.

use std::sync::Arc;

use serde_json::Value;

use weft_observe::MetricsCollector;
use weft_types::context::ExecutionContext;
use weft_types::error::EngineError;

use crate::primitive::{BoxPrimitive, Primitive};

/// Fallible predicate evaluated against the input and context.
pub type Predicate =
    Arc<dyn Fn(&Value, &ExecutionContext) -> Result<bool, EngineError> + Send + Sync>;

/// Runs one of two branches depending on a predicate.
pub struct Conditional {
    name: String,
    predicate: Predicate,
    then_primitive: BoxPrimitive,
    else_primitive: Option<BoxPrimitive>,
    collector: Arc<MetricsCollector>,
}

impl Conditional {
    /// Create a conditional with a then-branch only; false passes the
    /// input through.
    pub fn new(
        name: impl Into<String>,
        predicate: Predicate,
        then_primitive: BoxPrimitive,
        collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            name: name.into(),
            predicate,
            then_primitive,
            else_primitive: None,
            collector,
        }
    }

    /// Attach an else-branch.
    pub fn with_else(mut self, else_primitive: BoxPrimitive) -> Self {
        self.else_primitive = Some(else_primitive);
        self
    }
}

impl Primitive for Conditional {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "conditional"
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EngineError> {
        let timer = self.collector.begin(&self.name, self.kind());

        let decision = match (self.predicate)(&input, ctx) {
            Ok(decision) => decision,
            Err(err) => {
                tracing::debug!(
                    conditional = self.name.as_str(),
                    error = %err,
                    "predicate failed"
                );
                timer.complete(false);
                return Err(err);
            }
        };

        let result = if decision {
            ctx.checkpoint("conditional.then");
            self.then_primitive.execute(input, ctx).await
        } else if let Some(else_primitive) = &self.else_primitive {
            ctx.checkpoint("conditional.else");
            else_primitive.execute(input, ctx).await
        } else {
            ctx.checkpoint("conditional.passthrough");
            Ok(input)
        };

        timer.complete(result.is_ok());
        result
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

    fn collector() -> Arc<MetricsCollector> {
        Arc::new(MetricsCollector::with_defaults())
    }

    fn constant(name: &str, value: Value) -> BoxPrimitive {
        FnPrimitive::new(name, move |_input: Value, _ctx: &mut ExecutionContext| {
            let value = value.clone();
            Box::pin(async move { Ok(value) }) as PrimitiveFuture<'_>
        })
        .boxed()
    }

    fn is_large() -> Predicate {
        Arc::new(|input, _ctx| Ok(input.as_i64().unwrap_or(0) > 100))
    }

    #[tokio::test]
    async fn true_runs_then_branch() {
        let cond = Conditional::new("size-gate", is_large(), constant("big", json!("big")), collector())
            .with_else(constant("small", json!("small")));

        let mut ctx = ExecutionContext::new("req-1");
        let out = cond.execute(json!(500), &mut ctx).await.unwrap();
        assert_eq!(out, json!("big"));
        assert!(ctx.checkpoint_names().contains(&"conditional.then"));
    }

    #[tokio::test]
    async fn false_runs_else_branch() {
        let cond = Conditional::new("size-gate", is_large(), constant("big", json!("big")), collector())
            .with_else(constant("small", json!("small")));

        let mut ctx = ExecutionContext::new("req-2");
        let out = cond.execute(json!(3), &mut ctx).await.unwrap();
        assert_eq!(out, json!("small"));
        assert!(ctx.checkpoint_names().contains(&"conditional.else"));
    }

    #[tokio::test]
    async fn false_without_else_passes_input_through() {
        let cond = Conditional::new("size-gate", is_large(), constant("big", json!("big")), collector());

        let mut ctx = ExecutionContext::new("req-3");
        let out = cond.execute(json!(3), &mut ctx).await.unwrap();
        assert_eq!(out, json!(3));
        assert_eq!(ctx.checkpoint_names(), vec!["conditional.passthrough"]);
    }

    #[tokio::test]
    async fn predicate_error_propagates() {
        let predicate: Predicate =
            Arc::new(|_input, _ctx| Err(EngineError::non_retryable("malformed input")));
        let cond = Conditional::new("gate", predicate, constant("big", json!("big")), collector());

        let mut ctx = ExecutionContext::new("req-4");
        let err = cond.execute(json!(1), &mut ctx).await.unwrap_err();
        assert_eq!(err, EngineError::non_retryable("malformed input"));
        assert!(ctx.checkpoints.is_empty());
    }

    #[tokio::test]
    async fn predicate_can_read_context_metadata() {
        let predicate: Predicate = Arc::new(|_input, ctx| {
            Ok(ctx.metadata.get("environment").map(String::as_str) == Some("production"))
        });
        let cond = Conditional::new("env-gate", predicate, constant("prod", json!("prod")), collector())
            .with_else(constant("dev", json!("dev")));

        let mut ctx = ExecutionContext::new("req-5").with_metadata("environment", "production");
        let out = cond.execute(json!(null), &mut ctx).await.unwrap();
        assert_eq!(out, json!("prod"));
    }
}
