//! Router combinator: keyed dispatch with a validated default route.
//!
//! A routing function maps `(input, ctx)` to a route key; the matching
//! primitive in the route table runs. Unknown keys and routing-function
//! failures fall back to the configured default route, which is validated
//! to exist at construction time.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use weft_observe::MetricsCollector;
use weft_types::context::ExecutionContext;
use weft_types::error::{ConfigError, EngineError};

use crate::primitive::{BoxPrimitive, Primitive};

/// Fallible routing function producing a route key.
pub type RouteFn =
    Arc<dyn Fn(&Value, &ExecutionContext) -> Result<String, EngineError> + Send + Sync>;

/// Dispatches to one of several primitives by route key.
pub struct Router {
    name: String,
    route_fn: RouteFn,
    routes: HashMap<String, BoxPrimitive>,
    default_route: String,
    collector: Arc<MetricsCollector>,
}

impl Router {
    /// Create a router. The default route must exist in the route table.
    pub fn new(
        name: impl Into<String>,
        route_fn: RouteFn,
        routes: HashMap<String, BoxPrimitive>,
        default_route: impl Into<String>,
        collector: Arc<MetricsCollector>,
    ) -> Result<Self, ConfigError> {
        if routes.is_empty() {
            return Err(ConfigError::Empty {
                what: "router routes".to_string(),
            });
        }
        let default_route = default_route.into();
        if !routes.contains_key(&default_route) {
            let mut available: Vec<String> = routes.keys().cloned().collect();
            available.sort();
            return Err(ConfigError::UnknownDefaultRoute {
                route: default_route,
                available,
            });
        }
        Ok(Self {
            name: name.into(),
            route_fn,
            routes,
            default_route,
            collector,
        })
    }

    /// Route keys known to this router.
    pub fn route_keys(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut routes: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        routes.sort();
        f.debug_struct("Router")
            .field("name", &self.name)
            .field("routes", &routes)
            .field("default_route", &self.default_route)
            .finish()
    }
}

impl Primitive for Router {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "router"
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EngineError> {
        let timer = self.collector.begin(&self.name, self.kind());

        let key = match (self.route_fn)(&input, ctx) {
            Ok(key) if self.routes.contains_key(&key) => key,
            Ok(key) => {
                tracing::warn!(
                    router = self.name.as_str(),
                    route = key.as_str(),
                    default = self.default_route.as_str(),
                    "unknown route key, dispatching to default"
                );
                self.default_route.clone()
            }
            Err(err) => {
                tracing::warn!(
                    router = self.name.as_str(),
                    error = %err,
                    default = self.default_route.as_str(),
                    "routing function failed, dispatching to default"
                );
                self.default_route.clone()
            }
        };

        ctx.checkpoint(format!("router.route.{key}"));

        // The key is guaranteed present: either validated above or the
        // construction-checked default.
        let Some(primitive) = self.routes.get(&key) else {
            timer.complete(false);
            return Err(EngineError::non_retryable(format!(
                "route '{key}' disappeared from router '{}'",
                self.name
            )));
        };

        let result = primitive.execute(input, ctx).await;
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

    fn by_tier() -> RouteFn {
        Arc::new(|input, _ctx| {
            input
                .get("tier")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| EngineError::non_retryable("missing tier"))
        })
    }

    fn routes() -> HashMap<String, BoxPrimitive> {
        let mut routes = HashMap::new();
        routes.insert("fast".to_string(), constant("fast", json!("fast lane")));
        routes.insert("slow".to_string(), constant("slow", json!("slow lane")));
        routes
    }

    #[tokio::test]
    async fn dispatches_by_route_key() {
        let router = Router::new("tier-router", by_tier(), routes(), "slow", collector()).unwrap();

        let mut ctx = ExecutionContext::new("req-1");
        let out = router
            .execute(json!({"tier": "fast"}), &mut ctx)
            .await
            .unwrap();
        assert_eq!(out, json!("fast lane"));
        assert!(ctx.checkpoint_names().contains(&"router.route.fast"));
    }

    #[tokio::test]
    async fn unknown_key_falls_back_to_default() {
        let router = Router::new("tier-router", by_tier(), routes(), "slow", collector()).unwrap();

        let mut ctx = ExecutionContext::new("req-2");
        let out = router
            .execute(json!({"tier": "hyperspeed"}), &mut ctx)
            .await
            .unwrap();
        assert_eq!(out, json!("slow lane"));
        assert!(ctx.checkpoint_names().contains(&"router.route.slow"));
    }

    #[tokio::test]
    async fn route_fn_failure_falls_back_to_default() {
        let router = Router::new("tier-router", by_tier(), routes(), "slow", collector()).unwrap();

        let mut ctx = ExecutionContext::new("req-3");
        let out = router.execute(json!({}), &mut ctx).await.unwrap();
        assert_eq!(out, json!("slow lane"));
    }

    #[tokio::test]
    async fn rejects_unknown_default_route_at_construction() {
        let err = Router::new("tier-router", by_tier(), routes(), "warp", collector()).unwrap_err();
        match err {
            ConfigError::UnknownDefaultRoute { route, available } => {
                assert_eq!(route, "warp");
                assert_eq!(available, vec!["fast".to_string(), "slow".to_string()]);
            }
            other => panic!("expected UnknownDefaultRoute, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_empty_route_table() {
        assert!(matches!(
            Router::new("empty", by_tier(), HashMap::new(), "any", collector()),
            Err(ConfigError::Empty { .. })
        ));
    }

    #[tokio::test]
    async fn route_fn_can_read_context_metadata() {
        let route_fn: RouteFn = Arc::new(|_input, ctx| {
            Ok(ctx
                .metadata
                .get("workload")
                .cloned()
                .unwrap_or_else(|| "slow".to_string()))
        });
        let router = Router::new("meta-router", route_fn, routes(), "slow", collector()).unwrap();

        let mut ctx = ExecutionContext::new("req-4").with_metadata("workload", "fast");
        let out = router.execute(json!(null), &mut ctx).await.unwrap();
        assert_eq!(out, json!("fast lane"));
    }
}
