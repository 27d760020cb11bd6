//! Fallback wrapper: primary with an ordered chain of alternates.
//!
//! The primary executes first; on failure each fallback is tried once, in
//! declared order, with the same input and context. The last failure
//! propagates when every branch fails. Which branch served the result is
//! recorded for observability (checkpoint, log line, counters). Unbounded
//! chaining only happens through explicit nesting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use weft_observe::MetricsCollector;
use weft_types::context::ExecutionContext;
use weft_types::error::EngineError;

use crate::primitive::{BoxPrimitive, Primitive};

/// Cumulative serving counters for a fallback wrapper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FallbackStats {
    /// Requests served by the primary.
    pub primary_served: u64,
    /// Requests served by any fallback branch.
    pub fallback_served: u64,
    /// Requests where every branch failed.
    pub exhausted: u64,
}

/// Executes a primary primitive, failing over to alternates.
pub struct Fallback {
    name: String,
    primary: BoxPrimitive,
    fallbacks: Vec<BoxPrimitive>,
    collector: Arc<MetricsCollector>,
    primary_served: AtomicU64,
    fallback_served: AtomicU64,
    exhausted: AtomicU64,
}

impl Fallback {
    /// Create a fallback pair. More alternates can be chained with
    /// [`Fallback::with_fallback`].
    pub fn new(
        name: impl Into<String>,
        primary: BoxPrimitive,
        fallback: BoxPrimitive,
        collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            name: name.into(),
            primary,
            fallbacks: vec![fallback],
            collector,
            primary_served: AtomicU64::new(0),
            fallback_served: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
        }
    }

    /// Append another alternate, tried after the existing ones.
    pub fn with_fallback(mut self, fallback: BoxPrimitive) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    /// Snapshot of the serving counters.
    pub fn stats(&self) -> FallbackStats {
        FallbackStats {
            primary_served: self.primary_served.load(Ordering::Relaxed),
            fallback_served: self.fallback_served.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}

impl Primitive for Fallback {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "fallback"
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EngineError> {
        let timer = self.collector.begin(&self.name, self.kind());

        match self.primary.execute(input.clone(), ctx).await {
            Ok(value) => {
                ctx.checkpoint(format!("fallback.{}.served", self.primary.name()));
                self.primary_served.fetch_add(1, Ordering::Relaxed);
                timer.complete(true);
                return Ok(value);
            }
            Err(err) => {
                ctx.checkpoint(format!("fallback.{}.failed", self.primary.name()));
                tracing::warn!(
                    wrapper = self.name.as_str(),
                    primary = self.primary.name(),
                    error = %err,
                    "primary failed, trying fallbacks"
                );

                let mut last_error = err;
                for fallback in &self.fallbacks {
                    match fallback.execute(input.clone(), ctx).await {
                        Ok(value) => {
                            ctx.checkpoint(format!("fallback.{}.served", fallback.name()));
                            self.fallback_served.fetch_add(1, Ordering::Relaxed);
                            tracing::info!(
                                wrapper = self.name.as_str(),
                                served_by = fallback.name(),
                                "request served by fallback"
                            );
                            timer.complete(true);
                            return Ok(value);
                        }
                        Err(err) => {
                            ctx.checkpoint(format!("fallback.{}.failed", fallback.name()));
                            tracing::warn!(
                                wrapper = self.name.as_str(),
                                fallback = fallback.name(),
                                error = %err,
                                "fallback failed"
                            );
                            last_error = err;
                        }
                    }
                }

                self.exhausted.fetch_add(1, Ordering::Relaxed);
                timer.complete(false);
                Err(last_error)
            }
        }
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

    fn failing(name: &str, message: &str) -> BoxPrimitive {
        let message = message.to_string();
        FnPrimitive::new(name, move |_input: Value, _ctx: &mut ExecutionContext| {
            let message = message.clone();
            Box::pin(async move { Err(EngineError::retryable(message)) })
                as PrimitiveFuture<'_>
        })
        .boxed()
    }

    #[tokio::test]
    async fn primary_success_skips_fallbacks() {
        let chain = Fallback::new(
            "chain",
            constant("primary", json!("from primary")),
            constant("backup", json!("from backup")),
            collector(),
        );

        let mut ctx = ExecutionContext::new("req-1");
        let out = chain.execute(json!(null), &mut ctx).await.unwrap();
        assert_eq!(out, json!("from primary"));
        assert_eq!(ctx.checkpoint_names(), vec!["fallback.primary.served"]);
        assert_eq!(
            chain.stats(),
            FallbackStats {
                primary_served: 1,
                ..FallbackStats::default()
            }
        );
    }

    #[tokio::test]
    async fn fallback_serves_and_primary_failure_is_recorded() {
        let chain = Fallback::new(
            "chain",
            failing("primary", "upstream down"),
            constant("backup", json!("from backup")),
            collector(),
        );

        let mut ctx = ExecutionContext::new("req-2");
        let out = chain.execute(json!(null), &mut ctx).await.unwrap();
        assert_eq!(out, json!("from backup"));
        assert_eq!(
            ctx.checkpoint_names(),
            vec!["fallback.primary.failed", "fallback.backup.served"]
        );
        let stats = chain.stats();
        assert_eq!(stats.primary_served, 0);
        assert_eq!(stats.fallback_served, 1);
    }

    #[tokio::test]
    async fn all_branches_failing_propagates_last_error() {
        let chain = Fallback::new(
            "chain",
            failing("primary", "first error"),
            failing("backup-a", "second error"),
            collector(),
        )
        .with_fallback(failing("backup-b", "third error"));

        let mut ctx = ExecutionContext::new("req-3");
        let err = chain.execute(json!(null), &mut ctx).await.unwrap_err();
        assert_eq!(err, EngineError::retryable("third error"));
        assert_eq!(chain.stats().exhausted, 1);
    }

    #[tokio::test]
    async fn fallbacks_receive_the_same_input() {
        let echoing = FnPrimitive::new("echo", |input: Value, _ctx: &mut ExecutionContext| {
            Box::pin(async move { Ok(input) }) as PrimitiveFuture<'_>
        })
        .boxed();

        let chain = Fallback::new("chain", failing("primary", "down"), echoing, collector());

        let mut ctx = ExecutionContext::new("req-4");
        let out = chain
            .execute(json!({"payload": 42}), &mut ctx)
            .await
            .unwrap();
        assert_eq!(out, json!({"payload": 42}));
    }

    #[tokio::test]
    async fn ordered_chain_stops_at_first_success() {
        let chain = Fallback::new(
            "chain",
            failing("primary", "down"),
            constant("backup-a", json!("a")),
            collector(),
        )
        .with_fallback(constant("backup-b", json!("b")));

        let mut ctx = ExecutionContext::new("req-5");
        let out = chain.execute(json!(null), &mut ctx).await.unwrap();
        assert_eq!(out, json!("a"));
        assert!(!ctx
            .checkpoint_names()
            .iter()
            .any(|n| n.contains("backup-b")));
    }
}
