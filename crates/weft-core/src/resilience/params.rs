//! Copy-on-read handle for tunable resilience parameters.
//!
//! Each tunable wrapper (`Retry`, `Timeout`, `Cache`) reads its numeric
//! knobs through a `TunableParams` handle at the start of every execution.
//! The adaptive controller is the only writer. Reads copy the small
//! parameter struct out under a short lock; the lock is never held across
//! an await point.

use std::sync::{Arc, RwLock};

use weft_types::strategy::StrategyParameters;

/// Shared, copy-on-read parameter handle.
///
/// Cloning the handle shares the underlying parameters; a wrapper and the
/// adaptive controller tuning it hold clones of the same handle.
#[derive(Debug, Clone)]
pub struct TunableParams {
    inner: Arc<RwLock<StrategyParameters>>,
}

impl TunableParams {
    /// Create a handle with initial parameters.
    pub fn new(parameters: StrategyParameters) -> Self {
        Self {
            inner: Arc::new(RwLock::new(parameters)),
        }
    }

    /// Copy the current parameters out.
    pub fn snapshot(&self) -> StrategyParameters {
        match self.inner.read() {
            Ok(guard) => *guard,
            // A poisoned lock still holds valid (Copy) data.
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Replace the current parameters. Controller-only.
    pub fn store(&self, parameters: StrategyParameters) {
        match self.inner.write() {
            Ok(mut guard) => *guard = parameters,
            Err(poisoned) => *poisoned.into_inner() = parameters,
        }
    }
}
