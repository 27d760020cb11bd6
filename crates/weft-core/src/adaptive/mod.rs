//! Adaptive resilience: the learn -> validate -> promote/reject loop.
//!
//! - `breaker` -- circuit breaker suspending learning under failure load
//! - `controller` -- per-pattern strategy lifecycle and parameter derivation
//! - `wrapper` -- the `Adaptive` primitive feeding outcomes into the
//!   controller

pub mod breaker;
pub mod controller;
pub mod wrapper;

pub use breaker::{BreakerState, LearningBreaker};
pub use controller::AdaptiveController;
pub use wrapper::Adaptive;
