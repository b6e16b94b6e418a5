//! Action throttling
//!
//! Two independent throttles gate how many votes are cast:
//! - [`ResourceBudget`]: the chain's regenerating voting power, compared
//!   against per-tier priority thresholds
//! - [`RateWindow`]: a sliding-window allotment of votes, persisted in the
//!   tracking store

pub mod rate_window;
pub mod resource;

pub use rate_window::{RateWindow, RateWindowConfig};
pub use resource::{BudgetSnapshot, ResourceBudget, FULL_BASIS_POINTS, REGEN_PERIOD_SECS};
