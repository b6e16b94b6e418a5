//! Collaborator seams
//!
//! The curation core never talks to the chain directly. Everything it needs
//! from the outside world goes through one of these traits, so hosts can
//! plug in an RPC client and tests can plug in doubles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::content::{ChainEvent, ContentId, ContentItem};
use crate::state::HistoryItem;

/// Chain error fragments that mean "this vote already exists".
const DUPLICATE_ACTION_MARKERS: &[&str] = &["Changing your vote requires", "Cannot vote again"];

/// Whether an executor error message is the chain's duplicate-vote rejection.
pub fn is_duplicate_action_message(message: &str) -> bool {
    DUPLICATE_ACTION_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Successful result of submitting a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The vote was broadcast
    Applied,
    /// The chain already holds this vote
    AlreadyDone,
}

/// Executor failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// The chain refused the operation
    #[error("action rejected: {0}")]
    Rejected(String),

    /// The request never got a definitive answer
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ExecutorError {
    /// A rejection carrying the chain's duplicate-vote message.
    pub fn is_duplicate_action(&self) -> bool {
        matches!(self, ExecutorError::Rejected(msg) if is_duplicate_action_message(msg))
    }
}

/// Failure of a read-side collaborator.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("failed to decode source data: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for read-side collaborators
pub type SourceResult<T> = Result<T, SourceError>;

/// Submits votes. Signing happens behind this seam.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Vote on `id` with `weight` percent (negative downvotes).
    async fn submit(&self, id: &ContentId, weight: f64) -> Result<ActionOutcome, ExecutorError>;
}

/// Fetches the current snapshot of a content item.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// `Ok(None)` when the content no longer exists.
    async fn fetch(&self, id: &ContentId) -> SourceResult<Option<ContentItem>>;
}

/// Resource level as reported by the chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResourceLevel {
    /// Already regenerated to the time of the query
    Fraction(f64),
    /// Raw voting power in basis points as stored at the last action
    Raw {
        basis_points: u32,
        last_action_at: DateTime<Utc>,
    },
}

/// Polled periodically to refresh the resource budget.
#[async_trait]
pub trait ResourceLevelSource: Send + Sync {
    async fn query_level(&self) -> SourceResult<ResourceLevel>;
}

/// Blocking pull of chain events, one at a time.
#[async_trait]
pub trait EventSource: Send {
    /// `Ok(None)` signals the stream has ended.
    async fn next_event(&mut self) -> SourceResult<Option<ChainEvent>>;
}

/// Reads the curating account's operation history.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Up to `limit` items with sequence numbers greater than `after`, oldest first.
    async fn account_history(&self, after: u64, limit: u32) -> SourceResult<Vec<HistoryItem>>;
}
