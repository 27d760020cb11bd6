//! Cache wrapper: keyed result caching with TTL expiry.
//!
//! A deterministic key function maps `(input, ctx)` to a cache key. A live
//! entry is returned without invoking the wrapped primitive; otherwise the
//! primitive runs and its result is stored with the current TTL. Expired
//! entries are evicted lazily on lookup and proactively via `sweep`. The
//! entry map is owned exclusively by this instance; concurrent same-key
//! misses may both populate it (last write wins, staleness is bounded by
//! TTL).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

use weft_observe::MetricsCollector;
use weft_types::config::CacheConfig;
use weft_types::context::ExecutionContext;
use weft_types::error::{ConfigError, EngineError};
use weft_types::strategy::StrategyParameters;

use crate::primitive::{BoxPrimitive, Primitive};
use crate::resilience::params::TunableParams;

/// Deterministic cache key derivation from input and context.
pub type CacheKeyFn = Arc<dyn Fn(&Value, &ExecutionContext) -> String + Send + Sync>;

/// One cached result.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    created_at: Instant,
    ttl: Duration,
    hit_count: u64,
}

impl CacheEntry {
    fn is_live(&self) -> bool {
        self.created_at.elapsed() <= self.ttl
    }
}

/// Cumulative cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    /// Lookups served from a live entry.
    pub hits: u64,
    /// Lookups that invoked the wrapped primitive.
    pub misses: u64,
    /// Entries evicted because their TTL elapsed.
    pub expirations: u64,
    /// Live entries currently stored.
    pub entries: usize,
    /// hits / (hits + misses); 0 when nothing was looked up yet.
    pub hit_rate: f64,
}

/// Wraps one primitive with keyed TTL caching.
pub struct Cache {
    name: String,
    inner: BoxPrimitive,
    key_fn: CacheKeyFn,
    max_entries: usize,
    params: TunableParams,
    entries: DashMap<String, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    collector: Arc<MetricsCollector>,
}

impl Cache {
    /// Create a cache wrapper from validated configuration.
    pub fn new(
        name: impl Into<String>,
        inner: BoxPrimitive,
        config: CacheConfig,
        key_fn: CacheKeyFn,
        collector: Arc<MetricsCollector>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let params = TunableParams::new(StrategyParameters {
            ttl_seconds: config.ttl_seconds,
            ..StrategyParameters::default()
        });
        Ok(Self {
            name: name.into(),
            inner,
            key_fn,
            max_entries: config.max_entries,
            params,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            collector,
        })
    }

    /// The tunable-parameter handle, for wiring into an adaptive wrapper.
    pub fn params_handle(&self) -> TunableParams {
        self.params.clone()
    }

    /// Snapshot of the cumulative counters.
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            expirations: self.expirations.load(Ordering::Relaxed),
            entries: self.entries.len(),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    /// Proactively evict every expired entry.
    pub fn sweep(&self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live());
        let evicted = before - self.entries.len();
        if evicted > 0 {
            self.expirations.fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(
                cache = self.name.as_str(),
                evicted,
                "swept expired entries"
            );
        }
    }

    /// Look up a live entry, lazily evicting it when expired.
    fn lookup(&self, key: &str) -> Option<Value> {
        let mut expired = false;
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.is_live() {
                entry.hit_count += 1;
                return Some(entry.value.clone());
            }
            expired = true;
        }
        if expired {
            self.entries.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    /// Store a result, evicting the oldest entry when at capacity.
    fn store(&self, key: String, value: Value, ttl: Duration) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.sweep();
            if self.entries.len() >= self.max_entries {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|entry| entry.value().created_at)
                    .map(|entry| entry.key().clone());
                if let Some(oldest_key) = oldest {
                    self.entries.remove(&oldest_key);
                }
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl,
                hit_count: 0,
            },
        );
    }
}

impl Primitive for Cache {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "cache"
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EngineError> {
        let timer = self.collector.begin(&self.name, self.kind());
        let ttl = Duration::from_secs_f64(self.params.snapshot().ttl_seconds);
        let key = (self.key_fn)(&input, ctx);

        if let Some(value) = self.lookup(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            ctx.checkpoint("cache.hit");
            timer.complete(true);
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        ctx.checkpoint("cache.miss");

        match self.inner.execute(input, ctx).await {
            Ok(value) => {
                self.store(key, value.clone(), ttl);
                timer.complete(true);
                Ok(value)
            }
            Err(err) => {
                // Failures are never cached.
                timer.complete(false);
                Err(err)
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
    use std::sync::atomic::AtomicU32;

    fn collector() -> Arc<MetricsCollector> {
        Arc::new(MetricsCollector::with_defaults())
    }

    fn input_key() -> CacheKeyFn {
        Arc::new(|input, _ctx| input.to_string())
    }

    fn counting(invocations: Arc<AtomicU32>) -> BoxPrimitive {
        FnPrimitive::new("source", move |input: Value, _ctx: &mut ExecutionContext| {
            let n = invocations.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(json!({"input": input, "call": n})) })
                as PrimitiveFuture<'_>
        })
        .boxed()
    }

    fn cache_with_ttl(ttl_seconds: f64, invocations: Arc<AtomicU32>) -> Cache {
        Cache::new(
            "cache",
            counting(invocations),
            CacheConfig::new(ttl_seconds, 64).unwrap(),
            input_key(),
            collector(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn identical_input_invokes_underlying_once() {
        let invocations = Arc::new(AtomicU32::new(0));
        let cache = cache_with_ttl(30.0, Arc::clone(&invocations));

        let mut ctx = ExecutionContext::new("req-1");
        let first = cache.execute(json!("query"), &mut ctx).await.unwrap();
        for _ in 0..4 {
            let again = cache.execute(json!("query"), &mut ctx).await.unwrap();
            assert_eq!(again, first);
        }

        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 4);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn expiry_reinvokes_and_counts() {
        let invocations = Arc::new(AtomicU32::new(0));
        let cache = cache_with_ttl(0.05, Arc::clone(&invocations));

        let mut ctx = ExecutionContext::new("req-2");
        cache.execute(json!("query"), &mut ctx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        cache.execute(json!("query"), &mut ctx).await.unwrap();

        assert_eq!(invocations.load(Ordering::SeqCst), 2);
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.expirations, 1);
    }

    #[tokio::test]
    async fn different_keys_miss_independently() {
        let invocations = Arc::new(AtomicU32::new(0));
        let cache = cache_with_ttl(30.0, Arc::clone(&invocations));

        let mut ctx = ExecutionContext::new("req-3");
        cache.execute(json!("a"), &mut ctx).await.unwrap();
        cache.execute(json!("b"), &mut ctx).await.unwrap();

        assert_eq!(invocations.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().entries, 2);
    }

    #[tokio::test]
    async fn writes_hit_and_miss_checkpoints() {
        let invocations = Arc::new(AtomicU32::new(0));
        let cache = cache_with_ttl(30.0, Arc::clone(&invocations));

        let mut ctx = ExecutionContext::new("req-4");
        cache.execute(json!("q"), &mut ctx).await.unwrap();
        cache.execute(json!("q"), &mut ctx).await.unwrap();
        assert_eq!(ctx.checkpoint_names(), vec!["cache.miss", "cache.hit"]);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let invocations = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&invocations);
        let flaky = FnPrimitive::new("flaky", move |_input: Value, _ctx: &mut ExecutionContext| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if n == 0 {
                    Err(EngineError::retryable("first call fails"))
                } else {
                    Ok(json!("recovered"))
                }
            }) as PrimitiveFuture<'_>
        })
        .boxed();

        let cache = Cache::new(
            "cache",
            flaky,
            CacheConfig::new(30.0, 64).unwrap(),
            input_key(),
            collector(),
        )
        .unwrap();

        let mut ctx = ExecutionContext::new("req-5");
        cache.execute(json!("q"), &mut ctx).await.unwrap_err();
        let out = cache.execute(json!("q"), &mut ctx).await.unwrap();
        assert_eq!(out, json!("recovered"));
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_entry() {
        let invocations = Arc::new(AtomicU32::new(0));
        let cache = Cache::new(
            "cache",
            counting(Arc::clone(&invocations)),
            CacheConfig::new(30.0, 2).unwrap(),
            input_key(),
            collector(),
        )
        .unwrap();

        let mut ctx = ExecutionContext::new("req-6");
        cache.execute(json!("a"), &mut ctx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.execute(json!("b"), &mut ctx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.execute(json!("c"), &mut ctx).await.unwrap();

        assert_eq!(cache.stats().entries, 2);
        // "a" was oldest and evicted; re-requesting it misses.
        cache.execute(json!("a"), &mut ctx).await.unwrap();
        assert_eq!(invocations.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn sweep_evicts_expired_entries() {
        let invocations = Arc::new(AtomicU32::new(0));
        let cache = cache_with_ttl(0.02, Arc::clone(&invocations));

        let mut ctx = ExecutionContext::new("req-7");
        cache.execute(json!("a"), &mut ctx).await.unwrap();
        cache.execute(json!("b"), &mut ctx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        cache.sweep();
        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.expirations, 2);
    }

    #[tokio::test]
    async fn adaptive_handle_retunes_ttl() {
        let invocations = Arc::new(AtomicU32::new(0));
        let cache = cache_with_ttl(3600.0, Arc::clone(&invocations));

        // Controller shrinks the TTL; entries stored afterwards expire fast.
        let handle = cache.params_handle();
        handle.store(StrategyParameters {
            ttl_seconds: 0.02,
            ..handle.snapshot()
        });

        let mut ctx = ExecutionContext::new("req-8");
        cache.execute(json!("q"), &mut ctx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.execute(json!("q"), &mut ctx).await.unwrap();

        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }
}
