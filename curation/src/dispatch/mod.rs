//! Action dispatch
//!
//! The [`Dispatcher`] turns tracked records into votes, guarded by a
//! [`FailureBreaker`] that pauses submissions while the executor keeps failing.

pub mod breaker;
pub mod dispatcher;

pub use breaker::{BreakerState, FailureBreaker};
pub use dispatcher::{CycleReport, DispatchError, DispatchResult, Dispatcher};
