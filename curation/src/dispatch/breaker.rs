//! Failure breaker for the action executor.
//!
//! Counts consecutive dispatch cycles that ended in an executor error. When
//! the count reaches the threshold the breaker *opens* and submissions pause.
//! After a cooldown it enters *half-open* state and one probe cycle is
//! allowed to submit; a clean probe closes it again.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Healthy, submissions allowed
    Closed,
    /// Tripped, submissions paused until the cooldown expires
    Open,
    /// Cooldown expired, one probe cycle allowed
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Consecutive-failure breaker around executor submissions.
#[derive(Debug, Clone)]
pub struct FailureBreaker {
    consecutive_failures: u32,
    last_failure: Option<DateTime<Utc>>,
    /// Consecutive failed cycles before the breaker opens.
    pub failure_threshold: u32,
    /// Time after the last failure before Open → HalfOpen.
    pub cooldown: Duration,
}

impl FailureBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            last_failure: None,
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    /// A cycle submitted without executor errors.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_failure = None;
    }

    /// A cycle ended in an executor error.
    ///
    /// Returns `true` only for the failure that first trips the breaker, so
    /// the caller escalates once per outage.
    pub fn record_failure(&mut self, at: DateTime<Utc>) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure = Some(at);
        self.consecutive_failures == self.failure_threshold
    }

    pub fn state(&self, now: DateTime<Utc>) -> BreakerState {
        if self.consecutive_failures < self.failure_threshold {
            return BreakerState::Closed;
        }
        let elapsed = self
            .last_failure
            .map(|last| now.signed_duration_since(last).to_std().unwrap_or_default())
            .unwrap_or(Duration::MAX);
        if elapsed >= self.cooldown {
            BreakerState::HalfOpen
        } else {
            BreakerState::Open
        }
    }

    /// Whether submissions may run (Closed or HalfOpen).
    pub fn allows_submissions(&self, now: DateTime<Utc>) -> bool {
        !matches!(self.state(now), BreakerState::Open)
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}

impl Default for FailureBreaker {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60))
    }
}
