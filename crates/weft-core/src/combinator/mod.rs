//! Structural combinators over the `Primitive` contract.
//!
//! - `sequential` -- ordered pipe, output feeds the next input
//! - `parallel` -- concurrent fan-out with input-order results
//! - `conditional` -- predicate-gated branching with passthrough
//! - `router` -- keyed dispatch with a validated default route

pub mod conditional;
pub mod parallel;
pub mod router;
pub mod sequential;

pub use conditional::{Conditional, Predicate};
pub use parallel::Parallel;
pub use router::{RouteFn, Router};
pub use sequential::Sequential;
