//! Regenerating resource budget (voting power)
//!
//! The chain regenerates the resource linearly from the moment it was last
//! observed, reaching full capacity after [`REGEN_PERIOD_SECS`]. The model
//! never polls on its own: callers refresh it with [`ResourceBudget::observe`]
//! and read the extrapolated level with [`ResourceBudget::current`].

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds for the resource to regenerate from empty to full (5 days).
pub const REGEN_PERIOD_SECS: i64 = 5 * 24 * 60 * 60;

/// Chain representation of a full resource, in basis points.
pub const FULL_BASIS_POINTS: u32 = 10_000;

/// Last known level of the resource and when it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    /// Fraction in `0.0..=1.0`
    pub level: f64,
    pub observed_at: DateTime<Utc>,
}

impl BudgetSnapshot {
    /// Extrapolate the level to `now`: `min(1.0, level + elapsed / REGEN_PERIOD)`.
    ///
    /// Time before the observation counts as zero elapsed.
    pub fn current(&self, now: DateTime<Utc>) -> f64 {
        let elapsed_ms = now
            .signed_duration_since(self.observed_at)
            .num_milliseconds()
            .max(0);
        let regenerated = elapsed_ms as f64 / 1000.0 / REGEN_PERIOD_SECS as f64;
        (self.level + regenerated).min(1.0)
    }
}

fn clamp_level(level: f64) -> f64 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}

/// Thread-safe holder of the latest [`BudgetSnapshot`].
#[derive(Debug, Default)]
pub struct ResourceBudget {
    snapshot: RwLock<Option<BudgetSnapshot>>,
}

impl ResourceBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the externally reported level as of `observed_at`.
    pub fn observe(&self, level: f64, observed_at: DateTime<Utc>) {
        let next = BudgetSnapshot {
            level: clamp_level(level),
            observed_at,
        };
        match self.snapshot.write() {
            Ok(mut guard) => *guard = Some(next),
            Err(poisoned) => *poisoned.into_inner() = Some(next),
        }
    }

    /// Record the chain's raw voting power (basis points) as of the last action.
    ///
    /// The chain stores the power left right after the last vote; regeneration
    /// since then is extrapolated by [`ResourceBudget::current`].
    pub fn observe_raw(&self, basis_points: u32, last_action_at: DateTime<Utc>) {
        let level = f64::from(basis_points.min(FULL_BASIS_POINTS)) / f64::from(FULL_BASIS_POINTS);
        self.observe(level, last_action_at);
    }

    /// Latest snapshot, if any observation has been made
    pub fn snapshot(&self) -> Option<BudgetSnapshot> {
        match self.snapshot.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Current level at `now`. Zero until the first observation.
    pub fn current(&self, now: DateTime<Utc>) -> f64 {
        self.snapshot().map(|s| s.current(now)).unwrap_or(0.0)
    }
}
