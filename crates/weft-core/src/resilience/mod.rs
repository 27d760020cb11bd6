//! Resilience wrappers over the `Primitive` contract.
//!
//! - `retry` -- bounded re-execution with exponential backoff and jitter
//! - `timeout` -- deadline racing with cooperative subtree cancellation
//! - `fallback` -- primary plus an ordered chain of alternates
//! - `cache` -- keyed TTL result caching
//! - `params` -- the copy-on-read knob handle the adaptive controller
//!   writes through

pub mod cache;
pub mod fallback;
pub mod params;
pub mod retry;
pub mod timeout;

pub use cache::{Cache, CacheKeyFn, CacheStats};
pub use fallback::{Fallback, FallbackStats};
pub use params::TunableParams;
pub use retry::Retry;
pub use timeout::Timeout;
