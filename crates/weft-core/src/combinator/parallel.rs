//! Parallel combinator: concurrent fan-out over independent child contexts.
//!
//! Every branch receives the same input and a value-copied child context
//! (own span, own checkpoint log, shared cancellation token). Results come
//! back in input order regardless of completion timing. The combinator
//! fails as soon as any branch failure is observed, but it does not abort
//! siblings that are already running -- cancellation propagation is the job
//! of an outer `Timeout`.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use weft_observe::MetricsCollector;
use weft_types::context::ExecutionContext;
use weft_types::error::{ConfigError, EngineError};

use crate::primitive::{BoxPrimitive, Primitive};

/// Executes a list of primitives concurrently and returns their results in
/// input order.
pub struct Parallel {
    name: String,
    branches: Vec<Arc<BoxPrimitive>>,
    collector: Arc<MetricsCollector>,
}

impl Parallel {
    /// Create a parallel fan-out. Rejects an empty branch list.
    pub fn new(
        name: impl Into<String>,
        branches: Vec<BoxPrimitive>,
        collector: Arc<MetricsCollector>,
    ) -> Result<Self, ConfigError> {
        if branches.is_empty() {
            return Err(ConfigError::Empty {
                what: "parallel branches".to_string(),
            });
        }
        Ok(Self {
            name: name.into(),
            branches: branches.into_iter().map(Arc::new).collect(),
            collector,
        })
    }

    /// Number of branches.
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    /// Whether the fan-out has no branches (never true after construction).
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

impl Primitive for Parallel {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "parallel"
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EngineError> {
        let timer = self.collector.begin(&self.name, self.kind());
        ctx.checkpoint("parallel.start");

        let branch_count = self.branches.len();
        let (tx, mut rx) = mpsc::channel(branch_count);

        // Branches run as detached tasks so an early failure here does not
        // abort siblings already in flight.
        for (idx, branch) in self.branches.iter().enumerate() {
            let branch = Arc::clone(branch);
            let mut child_ctx = ctx.child();
            let branch_input = input.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let result = if child_ctx.is_cancelled() {
                    Err(EngineError::retryable("branch cancelled before start"))
                } else {
                    branch.execute(branch_input, &mut child_ctx).await
                };
                let _ = tx.send((idx, result, child_ctx)).await;
            });
        }
        drop(tx);

        let mut results: Vec<Option<Value>> = (0..branch_count).map(|_| None).collect();
        let mut remaining = branch_count;

        while let Some((idx, result, child_ctx)) = rx.recv().await {
            ctx.absorb(child_ctx);
            match result {
                Ok(value) => {
                    results[idx] = Some(value);
                    remaining -= 1;
                    if remaining == 0 {
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!(
                        fanout = self.name.as_str(),
                        branch = idx,
                        error = %err,
                        "parallel branch failed, failing fast"
                    );
                    timer.complete(false);
                    return Err(err);
                }
            }
        }

        let ordered = results
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| {
                    EngineError::non_retryable("parallel branch terminated without a result")
                })
            })
            .collect::<Result<Vec<Value>, EngineError>>()?;

        ctx.checkpoint("parallel.end");
        timer.complete(true);
        Ok(Value::Array(ordered))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
