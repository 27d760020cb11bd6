//! The weft execution engine: a small algebra of composable work
//! primitives with resilience policies and adaptive parameter tuning.
//!
//! A caller builds a primitive graph by composition -- combinators for
//! structure, wrappers for resilience, `Instrumented` for observability,
//! `Adaptive` for online tuning -- then calls `execute(input, ctx)` on the
//! root. Every node implements the same one-method [`primitive::Primitive`]
//! contract, so nesting is arbitrary:
//!
//! ```ignore
//! let graph = Sequential::new(
//!     "ingest",
//!     vec![
//!         Retry::new("fetch-retry", fetch, retry_config, collector.clone())?.boxed(),
//!         Timeout::new("parse-deadline", parse, timeout_config, collector.clone())?.boxed(),
//!     ],
//!     collector,
//! )?;
//! let output = graph.execute(input, &mut ctx).await?;
//! ```

pub mod adaptive;
pub mod combinator;
pub mod instrument;
pub mod primitive;
pub mod resilience;

pub use adaptive::{Adaptive, AdaptiveController};
pub use combinator::{Conditional, Parallel, Predicate, RouteFn, Router, Sequential};
pub use instrument::Instrumented;
pub use primitive::{BoxPrimitive, FnPrimitive, Primitive, PrimitiveExt, PrimitiveFuture};
pub use resilience::{Cache, CacheKeyFn, CacheStats, Fallback, FallbackStats, Retry, Timeout, TunableParams};
