//! The `Primitive` contract and its type-erased form.
//!
//! Every unit of work in weft -- leaf or combinator -- implements one
//! operation: `execute(input, ctx)`. Composition is the only way to add
//! behavior; no primitive inspects another's internals.
//!
//! `Primitive` uses RPITIT (return-position `impl Trait` in traits) for its
//! async method, consistent with the workspace's Rust 2024 edition approach.
//! Since RPITIT traits are not object-safe, `BoxPrimitive` provides dynamic
//! dispatch via the blanket-impl pattern:
//! 1. Define an object-safe `PrimitiveDyn` trait with boxed futures
//! 2. Blanket-impl `PrimitiveDyn` for all `T: Primitive`
//! 3. `BoxPrimitive` wraps `Box<dyn PrimitiveDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use weft_types::context::ExecutionContext;
use weft_types::error::EngineError;

// ---------------------------------------------------------------------------
// Primitive trait
// ---------------------------------------------------------------------------

/// A composable unit of work.
///
/// `execute` may fail with an [`EngineError`] and may append checkpoints to
/// the context as a side effect. Implementations must not block the caller
/// indefinitely; bounding execution time is the job of a `Timeout` wrapper
/// above them.
pub trait Primitive: Send + Sync {
    /// Human-readable primitive name, used as the metric label.
    fn name(&self) -> &str;

    /// Primitive kind label, e.g. `"sequential"`, `"retry"`, `"leaf"`.
    fn kind(&self) -> &'static str {
        "leaf"
    }

    /// Execute against an input and the request's execution context.
    fn execute(
        &self,
        input: Value,
        ctx: &mut ExecutionContext,
    ) -> impl Future<Output = Result<Value, EngineError>> + Send;
}

// ---------------------------------------------------------------------------
// Object-safe form
// ---------------------------------------------------------------------------

/// Boxed future returned by type-erased primitives.
pub type PrimitiveFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Value, EngineError>> + Send + 'a>>;

/// Object-safe version of [`Primitive`] with boxed futures.
///
/// Exists solely to enable dynamic dispatch; a blanket implementation is
/// provided for every `Primitive`.
pub trait PrimitiveDyn: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> &'static str;

    fn execute_boxed<'a>(
        &'a self,
        input: Value,
        ctx: &'a mut ExecutionContext,
    ) -> PrimitiveFuture<'a>;
}

/// Blanket implementation: any `Primitive` automatically implements
/// `PrimitiveDyn`.
impl<T: Primitive> PrimitiveDyn for T {
    fn name(&self) -> &str {
        Primitive::name(self)
    }

    fn kind(&self) -> &'static str {
        Primitive::kind(self)
    }

    fn execute_boxed<'a>(
        &'a self,
        input: Value,
        ctx: &'a mut ExecutionContext,
    ) -> PrimitiveFuture<'a> {
        Box::pin(self.execute(input, ctx))
    }
}

/// Type-erased primitive, the element type combinators hold.
///
/// Wraps any `Primitive` behind dynamic dispatch so heterogeneous graphs
/// can be built at runtime.
pub struct BoxPrimitive {
    inner: Box<dyn PrimitiveDyn>,
}

impl BoxPrimitive {
    /// Wrap a concrete `Primitive` in a type-erased box.
    pub fn new<T: Primitive + 'static>(primitive: T) -> Self {
        Self {
            inner: Box::new(primitive),
        }
    }
}

impl Primitive for BoxPrimitive {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> &'static str {
        self.inner.kind()
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EngineError> {
        self.inner.execute_boxed(input, ctx).await
    }
}

impl std::fmt::Debug for BoxPrimitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxPrimitive")
            .field("name", &self.inner.name())
            .field("kind", &self.inner.kind())
            .finish()
    }
}

/// Ergonomic `.boxed()` for building graphs.
pub trait PrimitiveExt: Primitive + Sized + 'static {
    /// Erase the concrete type. Avoid calling on an already-boxed primitive.
    fn boxed(self) -> BoxPrimitive {
        BoxPrimitive::new(self)
    }
}

impl<T: Primitive + Sized + 'static> PrimitiveExt for T {}

// ---------------------------------------------------------------------------
// Closure leaf
// ---------------------------------------------------------------------------

/// Leaf primitive built from an async closure.
///
/// The bridge for collaborator-supplied work (HTTP clients, DB access) and
/// the mock of choice in tests:
///
/// ```ignore
/// let leaf = FnPrimitive::new("double", |input, _ctx| {
///     Box::pin(async move { Ok(json!(input.as_i64().unwrap_or(0) * 2)) })
/// });
/// ```
pub struct FnPrimitive<F> {
    name: String,
    func: F,
}

impl<F> FnPrimitive<F>
where
    F: for<'a> Fn(Value, &'a mut ExecutionContext) -> PrimitiveFuture<'a> + Send + Sync,
{
    /// Create a named leaf from a closure.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Primitive for FnPrimitive<F>
where
    F: for<'a> Fn(Value, &'a mut ExecutionContext) -> PrimitiveFuture<'a> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EngineError> {
        (self.func)(input, ctx).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
