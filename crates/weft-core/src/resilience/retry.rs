//! Retry wrapper with exponential backoff and optional jitter.
//!
//! Failures classified as retryable are re-executed up to `max_retries`
//! times; non-retryable failures propagate immediately, and exhausting the
//! budget propagates the last error. Every attempt is a full execute call,
//! no partial-state resume. The backoff sleep is a cancellation-aware
//! suspension point.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;

use weft_observe::MetricsCollector;
use weft_types::config::RetryConfig;
use weft_types::context::ExecutionContext;
use weft_types::error::{ConfigError, EngineError};
use weft_types::strategy::StrategyParameters;

use crate::primitive::{BoxPrimitive, Primitive};
use crate::resilience::params::TunableParams;

/// Backoff delays are capped so a runaway exponential cannot park an
/// execution for hours.
const MAX_DELAY_MS: u64 = 60_000;

/// Wraps one primitive with bounded, backed-off re-execution.
pub struct Retry {
    name: String,
    inner: BoxPrimitive,
    config: RetryConfig,
    params: TunableParams,
    collector: Arc<MetricsCollector>,
}

impl Retry {
    /// Create a retry wrapper from validated configuration.
    pub fn new(
        name: impl Into<String>,
        inner: BoxPrimitive,
        config: RetryConfig,
        collector: Arc<MetricsCollector>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let params = TunableParams::new(StrategyParameters {
            max_retries: config.max_retries,
            backoff_base: config.backoff_base,
            ..StrategyParameters::default()
        });
        Ok(Self {
            name: name.into(),
            inner,
            config,
            params,
            collector,
        })
    }

    /// The tunable-parameter handle, for wiring into an adaptive wrapper.
    pub fn params_handle(&self) -> TunableParams {
        self.params.clone()
    }

    /// Delay before retry number `attempt` (1-based).
    fn backoff_delay(&self, attempt: u32, backoff_base: f64) -> Duration {
        let exponential =
            self.config.base_delay_ms as f64 * backoff_base.powi(attempt as i32);
        let mut delay_ms = exponential.min(MAX_DELAY_MS as f64);
        if self.config.jitter {
            // Full jitter: uniform in [0, delay].
            delay_ms = rand::thread_rng().gen_range(0.0..=delay_ms);
        }
        Duration::from_millis(delay_ms as u64)
    }
}

impl Primitive for Retry {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "retry"
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EngineError> {
        let timer = self.collector.begin(&self.name, self.kind());
        let snapshot = self.params.snapshot();
        let max_retries = snapshot.max_retries;
        let backoff_base = snapshot.backoff_base;

        let mut attempt: u32 = 0;
        loop {
            match self.inner.execute(input.clone(), ctx).await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(
                            wrapper = self.name.as_str(),
                            attempt,
                            "succeeded after retry"
                        );
                    }
                    timer.complete(true);
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    let delay = self.backoff_delay(attempt, backoff_base);
                    tracing::debug!(
                        wrapper = self.name.as_str(),
                        attempt,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retryable failure, backing off"
                    );
                    ctx.checkpoint(format!("retry.attempt_{attempt}"));

                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = ctx.cancellation.cancelled() => {
                            tracing::debug!(
                                wrapper = self.name.as_str(),
                                "cancelled during backoff"
                            );
                            timer.complete(false);
                            return Err(err);
                        }
                    }
                }
                Err(err) => {
                    timer.complete(false);
                    return Err(err);
                }
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
    use std::sync::atomic::{AtomicU32, Ordering};

    fn collector() -> Arc<MetricsCollector> {
        Arc::new(MetricsCollector::with_defaults())
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig::new(max_retries, 2.0)
            .unwrap()
            .with_base_delay_ms(1)
    }

    /// Fails with a retryable error `failures` times, then succeeds.
    fn flaky(failures: u32, invocations: Arc<AtomicU32>) -> BoxPrimitive {
        FnPrimitive::new("flaky", move |_input: Value, _ctx: &mut ExecutionContext| {
            let n = invocations.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if n < failures {
                    Err(EngineError::retryable("transient glitch"))
                } else {
                    Ok(json!("recovered"))
                }
            }) as PrimitiveFuture<'_>
        })
        .boxed()
    }

    #[tokio::test]
    async fn returns_success_after_exactly_k_plus_one_invocations() {
        let invocations = Arc::new(AtomicU32::new(0));
        let retry = Retry::new(
            "retry",
            flaky(3, Arc::clone(&invocations)),
            fast_config(3),
            collector(),
        )
        .unwrap();

        let mut ctx = ExecutionContext::new("req-1");
        let out = retry.execute(json!(null), &mut ctx).await.unwrap();
        assert_eq!(out, json!("recovered"));
        assert_eq!(invocations.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exhausted_budget_propagates_last_error() {
        let invocations = Arc::new(AtomicU32::new(0));
        let retry = Retry::new(
            "retry",
            flaky(5, Arc::clone(&invocations)),
            fast_config(2),
            collector(),
        )
        .unwrap();

        let mut ctx = ExecutionContext::new("req-2");
        let err = retry.execute(json!(null), &mut ctx).await.unwrap_err();
        assert_eq!(err, EngineError::retryable("transient glitch"));
        // max_retries + 1 invocations.
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_propagates_immediately() {
        let invocations = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&invocations);
        let leaf = FnPrimitive::new("fatal", move |_input: Value, _ctx: &mut ExecutionContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Err(EngineError::non_retryable("validation failed")) })
                as PrimitiveFuture<'_>
        })
        .boxed();

        let retry = Retry::new("retry", leaf, fast_config(5), collector()).unwrap();

        let mut ctx = ExecutionContext::new("req-3");
        let err = retry.execute(json!(null), &mut ctx).await.unwrap_err();
        assert_eq!(err, EngineError::non_retryable("validation failed"));
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_retries_is_a_single_attempt() {
        let invocations = Arc::new(AtomicU32::new(0));
        let retry = Retry::new(
            "retry",
            flaky(1, Arc::clone(&invocations)),
            fast_config(0),
            collector(),
        )
        .unwrap();

        let mut ctx = ExecutionContext::new("req-4");
        retry.execute(json!(null), &mut ctx).await.unwrap_err();
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn writes_attempt_checkpoints() {
        let invocations = Arc::new(AtomicU32::new(0));
        let retry = Retry::new(
            "retry",
            flaky(2, Arc::clone(&invocations)),
            fast_config(2),
            collector(),
        )
        .unwrap();

        let mut ctx = ExecutionContext::new("req-5");
        retry.execute(json!(null), &mut ctx).await.unwrap();
        assert_eq!(
            ctx.checkpoint_names(),
            vec!["retry.attempt_1", "retry.attempt_2"]
        );
    }

    #[tokio::test]
    async fn cancellation_during_backoff_returns_last_error() {
        let invocations = Arc::new(AtomicU32::new(0));
        let retry = Retry::new(
            "retry",
            flaky(10, Arc::clone(&invocations)),
            // Long enough that cancellation lands mid-backoff.
            RetryConfig::new(5, 2.0).unwrap().with_base_delay_ms(5_000),
            collector(),
        )
        .unwrap();

        let mut ctx = ExecutionContext::new("req-6");
        let token = ctx.cancellation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = retry.execute(json!(null), &mut ctx).await.unwrap_err();
        assert_eq!(err, EngineError::retryable("transient glitch"));
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn adaptive_handle_overrides_retry_budget() {
        let invocations = Arc::new(AtomicU32::new(0));
        let retry = Retry::new(
            "retry",
            flaky(2, Arc::clone(&invocations)),
            fast_config(5),
            collector(),
        )
        .unwrap();

        // A controller dials retries down to zero.
        let handle = retry.params_handle();
        handle.store(StrategyParameters {
            max_retries: 0,
            ..handle.snapshot()
        });

        let mut ctx = ExecutionContext::new("req-7");
        retry.execute(json!(null), &mut ctx).await.unwrap_err();
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let retry = Retry::new(
            "retry",
            FnPrimitive::new("noop", |input: Value, _ctx: &mut ExecutionContext| {
                Box::pin(async move { Ok(input) }) as PrimitiveFuture<'_>
            })
            .boxed(),
            RetryConfig::new(3, 2.0).unwrap().with_base_delay_ms(100),
            collector(),
        )
        .unwrap();

        assert_eq!(retry.backoff_delay(1, 2.0), Duration::from_millis(200));
        assert_eq!(retry.backoff_delay(2, 2.0), Duration::from_millis(400));
        assert_eq!(retry.backoff_delay(3, 2.0), Duration::from_millis(800));
        // Deep attempts saturate at the cap.
        assert_eq!(retry.backoff_delay(30, 2.0), Duration::from_millis(MAX_DELAY_MS));
    }

    #[test]
    fn jittered_backoff_stays_within_bounds() {
        let retry = Retry::new(
            "retry",
            FnPrimitive::new("noop", |input: Value, _ctx: &mut ExecutionContext| {
                Box::pin(async move { Ok(input) }) as PrimitiveFuture<'_>
            })
            .boxed(),
            RetryConfig::new(3, 2.0)
                .unwrap()
                .with_base_delay_ms(100)
                .with_jitter(),
            collector(),
        )
        .unwrap();

        for _ in 0..50 {
            let delay = retry.backoff_delay(2, 2.0);
            assert!(delay <= Duration::from_millis(400));
        }
    }
}
