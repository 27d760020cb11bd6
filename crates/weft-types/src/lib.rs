//! Shared domain types for the weft execution engine.
//!
//! This crate defines the vocabulary every other weft crate speaks:
//! execution contexts with W3C trace identity, validated wrapper
//! configuration, strategy types for the adaptive controller, and the
//! error taxonomies. It depends on no engine machinery.

pub mod config;
pub mod context;
pub mod error;
pub mod strategy;

pub use config::{AdaptiveConfig, CacheConfig, LearningMode, RetryConfig, TimeoutConfig};
pub use context::{Checkpoint, ExecutionContext, TraceContext, TraceParseError};
pub use error::{ConfigError, EngineError, LearningError};
pub use strategy::{
    derive_context_pattern, LearningPhase, Strategy, StrategyMetrics, StrategyParameters,
};
