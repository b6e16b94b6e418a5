//! Dispatch cycle
//!
//! One cycle: snapshot the tracked records, re-fetch and re-evaluate each
//! item, submit the approved votes, then commit every outcome in one pass.
//! Cycles never overlap: the cycle mutex is held from the snapshot until
//! the commit has been written.
//!
//! The store lock is never held while the executor runs, so a slow
//! submission cannot starve ingestion.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::breaker::{BreakerState, FailureBreaker};
use crate::budget::{RateWindow, ResourceBudget};
use crate::content::ContentId;
use crate::engine::{CurationEngine, VoteContext};
use crate::external::{ActionExecutor, ActionOutcome, ContentFetcher, ExecutorError};
use crate::state::{SharedTrackingStore, StoreError};

/// Error type for dispatch cycles
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Outcomes gathered before the failure were committed.
    #[error("Executor failed on {id}: {source} ({voted} voted and {skipped} skipped before the failure)")]
    Executor {
        id: ContentId,
        #[source]
        source: ExecutorError,
        voted: usize,
        skipped: usize,
    },

    /// Applied votes were recorded in the rate window; records keep their
    /// previous state.
    #[error(
        "Failed to commit cycle outcomes: {source}{}",
        .executor.as_ref().map(|(id, e)| format!(" (executor had failed on {}: {})", id, e)).unwrap_or_default()
    )]
    Commit {
        #[source]
        source: StoreError,
        /// Executor failure that ended the cycle early, if any
        executor: Option<(ContentId, ExecutorError)>,
    },
}

/// Result type for dispatch cycles
pub type DispatchResult<T> = Result<T, DispatchError>;

/// What one dispatch cycle did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Tracked records in the snapshot
    pub evaluated: usize,
    /// Committed as `Voted`, including `already_done`
    pub voted: Vec<ContentId>,
    /// Subset of `voted` the chain reported as already voted
    pub already_done: usize,
    /// Committed as `Skipped`
    pub skipped: Vec<ContentId>,
    /// Left `Tracked` for a later cycle
    pub still_tracked: usize,
    /// Re-fetches that failed; those items stay `Tracked`
    pub fetch_failures: usize,
    /// Approved votes held back because the breaker is open
    pub deferred: usize,
}

/// Drives the engine against tracked records and applies the outcomes.
pub struct Dispatcher {
    store: SharedTrackingStore,
    engine: CurationEngine,
    budget: Arc<ResourceBudget>,
    rate_window: Arc<RateWindow>,
    executor: Arc<dyn ActionExecutor>,
    fetcher: Arc<dyn ContentFetcher>,
    /// Cycle-scoped lock; also owns the breaker state.
    cycle: Mutex<FailureBreaker>,
}

impl Dispatcher {
    pub fn new(
        store: SharedTrackingStore,
        engine: CurationEngine,
        budget: Arc<ResourceBudget>,
        rate_window: Arc<RateWindow>,
        executor: Arc<dyn ActionExecutor>,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Self {
        Self {
            store,
            engine,
            budget,
            rate_window,
            executor,
            fetcher,
            cycle: Mutex::new(FailureBreaker::default()),
        }
    }

    /// Replace the default breaker (3 failures, 60s cooldown).
    pub fn with_breaker(mut self, breaker: FailureBreaker) -> Self {
        self.cycle = Mutex::new(breaker);
        self
    }

    pub fn engine(&self) -> &CurationEngine {
        &self.engine
    }

    /// Current breaker state
    pub async fn breaker_state(&self, now: DateTime<Utc>) -> BreakerState {
        self.cycle.lock().await.state(now)
    }

    /// Run one cycle at the current time.
    pub async fn run_cycle(&self) -> DispatchResult<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle as of `now`.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> DispatchResult<CycleReport> {
        let mut breaker = self.cycle.lock().await;
        let records = self.store.list_tracked()?;
        let budget = self.budget.current(now);
        let max_age = chrono::Duration::from_std(self.engine.policy().current().max_post_age())
            .unwrap_or(chrono::Duration::MAX);
        let mut report = CycleReport {
            evaluated: records.len(),
            ..CycleReport::default()
        };

        let mut to_vote: Vec<(ContentId, f64)> = Vec::new();
        let mut to_skip: Vec<ContentId> = Vec::new();

        for record in records {
            let item = match self.fetcher.fetch(&record.id).await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    debug!(identifier = %record.id, "Stop tracking because content no longer exists");
                    to_skip.push(record.id);
                    continue;
                }
                Err(e) => {
                    warn!(identifier = %record.id, error = %e, "Failed to fetch tracked content");
                    report.fetch_failures += 1;
                    continue;
                }
            };

            let unusable = if item.id != record.id {
                warn!(identifier = %record.id, fetched = %item.id, "Fetched content has a different identifier");
                true
            } else if let Err(e) = item.validate() {
                debug!(identifier = %record.id, error = %e, "Fetched content is malformed");
                true
            } else {
                false
            };
            if unusable {
                if now - record.created_at > max_age {
                    debug!(identifier = %record.id, "Stop tracking unusable content past the maximum age");
                    to_skip.push(record.id);
                } else {
                    report.still_tracked += 1;
                }
                continue;
            }

            let ctx = VoteContext::new(
                now,
                budget,
                self.rate_window.utilization_with_pending(now, to_vote.len()),
            );
            let (decision, weight) = self.engine.evaluate(&item, &ctx);

            match (decision.vote, weight) {
                (true, Some(weight)) => to_vote.push((record.id, weight)),
                (true, None) => {
                    warn!(identifier = %record.id, "Approved content has no voting weight");
                    report.still_tracked += 1;
                }
                (false, _) if !decision.track => {
                    debug!(identifier = %record.id, reason = %decision.reason, "Stop tracking");
                    to_skip.push(record.id);
                }
                (false, _) => {
                    debug!(identifier = %record.id, reason = %decision.reason, "Not voting yet");
                    report.still_tracked += 1;
                }
            }
        }

        if !to_vote.is_empty() && !breaker.allows_submissions(now) {
            info!(
                deferred = to_vote.len(),
                failures = breaker.failure_count(),
                "Executor breaker is open, deferring votes"
            );
            report.deferred = to_vote.len();
            report.still_tracked += to_vote.len();
            to_vote.clear();
        }

        let attempted = !to_vote.is_empty();
        let mut applied = 0usize;
        let mut failure: Option<(ContentId, ExecutorError)> = None;

        for (id, weight) in to_vote {
            match self.executor.submit(&id, weight).await {
                Ok(ActionOutcome::Applied) => {
                    info!(identifier = %id, weight, "Voted");
                    applied += 1;
                    report.voted.push(id);
                }
                Ok(ActionOutcome::AlreadyDone) => {
                    info!(identifier = %id, "Skipping already-voted content");
                    report.already_done += 1;
                    report.voted.push(id);
                }
                Err(e) if e.is_duplicate_action() => {
                    info!(identifier = %id, error = %e, "Skipping already-voted content");
                    report.already_done += 1;
                    report.voted.push(id);
                }
                Err(e) => {
                    failure = Some((id, e));
                    break;
                }
            }
        }

        // Votes this process cast count against the allotment even if the
        // commit fails: the next cycle would only see AlreadyDone for them.
        let recorded = (0..applied).try_for_each(|_| self.rate_window.record(now));
        let committed = self
            .store
            .mark_voted(&report.voted)
            .and_then(|_| self.store.mark_skipped(&to_skip));
        report.skipped = to_skip;

        if let Some((id, source)) = &failure {
            if breaker.record_failure(now) {
                error!(
                    failures = breaker.failure_count(),
                    cooldown_secs = breaker.cooldown.as_secs(),
                    "Executor keeps failing, pausing submissions"
                );
            }
            warn!(identifier = %id, error = %source, "Vote failed, will retry next cycle");
        }
        if let Err(source) = committed.and(recorded) {
            error!(error = %source, applied, "Failed to commit dispatch outcomes");
            return Err(DispatchError::Commit {
                source,
                executor: failure,
            });
        }

        if let Some((id, source)) = failure {
            return Err(DispatchError::Executor {
                id,
                source,
                voted: report.voted.len(),
                skipped: report.skipped.len(),
            });
        }

        if attempted {
            breaker.record_success();
        }
        debug!(
            evaluated = report.evaluated,
            voted = report.voted.len(),
            skipped = report.skipped.len(),
            still_tracked = report.still_tracked,
            "Dispatch cycle complete"
        );
        Ok(report)
    }
}
