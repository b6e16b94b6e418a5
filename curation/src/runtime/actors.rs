//! Long-running actors
//!
//! Every actor loops until its cancellation token fires. Work that has
//! started (an ingested event, a dispatch cycle) always runs to completion;
//! cancellation is only observed while waiting.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ingest::{IngestOutcome, Ingestor};
use super::RuntimeResult;
use crate::budget::ResourceBudget;
use crate::dispatch::{DispatchError, Dispatcher};
use crate::external::{EventSource, HistorySource, ResourceLevel, ResourceLevelSource};
use crate::state::SharedTrackingStore;

/// History entries requested per poll once some history is stored.
pub const HISTORY_BATCH: u32 = 500;

/// History entries requested when the store holds none yet.
pub const HISTORY_INITIAL_BATCH: u32 = 5_000;

/// Pause after an event source error before pulling again.
const SOURCE_RETRY_DELAY: Duration = Duration::from_secs(1);

fn ticker(period: Duration) -> time::Interval {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Pull events one at a time until the stream ends or shutdown is requested.
pub(crate) async fn run_ingestion(
    mut events: Box<dyn EventSource>,
    ingestor: Ingestor,
    cancel: CancellationToken,
) {
    debug!("Starting ingestion");
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = events.next_event() => next,
        };

        match next {
            Ok(Some(event)) => {
                let kind = event.kind();
                match ingestor.ingest(event, Utc::now()).await {
                    Ok(IngestOutcome::Tracked(reason)) => debug!(kind, reason = %reason, "Tracked new content"),
                    Ok(_) => {}
                    Err(e) => error!(kind, error = %e, "Failed to store ingested event"),
                }
            }
            Ok(None) => {
                info!("Event stream ended");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Event source failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = time::sleep(SOURCE_RETRY_DELAY) => {}
                }
            }
        }
    }
    debug!("Ingestion stopped");
}

/// Run a dispatch cycle every `period`.
pub(crate) async fn run_dispatch(
    dispatcher: Arc<Dispatcher>,
    period: Duration,
    cancel: CancellationToken,
) {
    debug!(interval_secs = period.as_secs(), "Starting dispatch");
    let mut interval = ticker(period);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        match dispatcher.run_cycle().await {
            Ok(report) if !report.voted.is_empty() || !report.skipped.is_empty() => info!(
                voted = report.voted.len(),
                already_done = report.already_done,
                skipped = report.skipped.len(),
                still_tracked = report.still_tracked,
                "Dispatch cycle complete"
            ),
            Ok(_) => {}
            Err(DispatchError::Executor { .. }) => {}
            Err(e) => error!(error = %e, "Dispatch cycle failed"),
        }
    }
    debug!("Dispatch stopped");
}

/// Refresh the resource budget from the chain every `period`.
pub(crate) async fn run_resource_refresh(
    source: Arc<dyn ResourceLevelSource>,
    budget: Arc<ResourceBudget>,
    period: Duration,
    cancel: CancellationToken,
) {
    debug!(interval_secs = period.as_secs(), "Starting resource refresh");
    let mut interval = ticker(period);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        let level = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            level = source.query_level() => level,
        };

        match level {
            Ok(ResourceLevel::Fraction(fraction)) => budget.observe(fraction, Utc::now()),
            Ok(ResourceLevel::Raw {
                basis_points,
                last_action_at,
            }) => budget.observe_raw(basis_points, last_action_at),
            Err(e) => {
                warn!(error = %e, "Failed to refresh resource level");
                continue;
            }
        }
        debug!(level = budget.current(Utc::now()), "Resource level refreshed");
    }
    debug!("Resource refresh stopped");
}

/// Fetch account history newer than what is stored and store it.
///
/// Returns the number of new items stored.
pub async fn sync_history(
    store: &SharedTrackingStore,
    source: &dyn HistorySource,
) -> RuntimeResult<usize> {
    let highest = store.highest_history_sequence()?;
    let limit = if highest == 0 {
        HISTORY_INITIAL_BATCH
    } else {
        HISTORY_BATCH
    };
    let items: Vec<_> = source
        .account_history(highest, limit)
        .await?
        .into_iter()
        .filter(|item| item.sequence > highest)
        .collect();
    Ok(store.put_history(&items)?)
}

/// Poll account history every `period`.
pub(crate) async fn run_history(
    store: SharedTrackingStore,
    source: Arc<dyn HistorySource>,
    period: Duration,
    cancel: CancellationToken,
) {
    debug!(interval_secs = period.as_secs(), "Starting account history monitor");
    let mut interval = ticker(period);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        match sync_history(&store, source.as_ref()).await {
            Ok(0) => {}
            Ok(count) => info!(count, "Stored account history"),
            Err(e) => warn!(error = %e, "Failed to update account history"),
        }
    }
    debug!("Account history monitor stopped");
}
