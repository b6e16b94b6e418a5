//! Core types persisted by the tracking store
//!
//! Tracking records and account history items are separate value types;
//! the only thing they share is the content identifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::schema::legacy;
use crate::content::ContentId;

/// Lifecycle state of a tracked identifier.
///
/// `Tracked → Voted` and `Tracked → Skipped` are the only transitions;
/// both targets are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Awaiting a future vote decision
    Tracked,
    /// Vote executed (or already present on chain)
    Voted,
    /// No longer eligible
    Skipped,
}

impl RecordState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecordState::Tracked)
    }

    /// Map a schema v1 tag byte to a state.
    pub fn from_legacy_tag(tag: u8) -> Option<Self> {
        match tag {
            legacy::UNTAGGED | legacy::TRACKED => Some(RecordState::Tracked),
            legacy::VOTED => Some(RecordState::Voted),
            legacy::SKIPPED => Some(RecordState::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordState::Tracked => write!(f, "tracked"),
            RecordState::Voted => write!(f, "voted"),
            RecordState::Skipped => write!(f, "skipped"),
        }
    }
}

/// Which rule justified tracking an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    Author,
    Delegate,
}

impl std::fmt::Display for ReasonKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReasonKind::Author => write!(f, "author"),
            ReasonKind::Delegate => write!(f, "delegate"),
        }
    }
}

/// Reason kind plus the account name that matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingReason {
    pub kind: ReasonKind,
    pub value: String,
}

impl TrackingReason {
    pub fn author(name: impl Into<String>) -> Self {
        Self {
            kind: ReasonKind::Author,
            value: name.into(),
        }
    }

    pub fn delegate(name: impl Into<String>) -> Self {
        Self {
            kind: ReasonKind::Delegate,
            value: name.into(),
        }
    }
}

impl std::fmt::Display for TrackingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Persistent lifecycle record for one identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub id: ContentId,
    pub state: RecordState,
    pub reason: TrackingReason,
    /// When the record was first created
    pub created_at: DateTime<Utc>,
}

impl TrackingRecord {
    /// Create a new record in the `Tracked` state
    pub fn new(id: ContentId, reason: TrackingReason) -> Self {
        Self {
            id,
            state: RecordState::Tracked,
            reason,
            created_at: Utc::now(),
        }
    }

    pub fn is_tracked(&self) -> bool {
        self.state == RecordState::Tracked
    }
}

/// Operation recorded in the curating account's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HistoryOperation {
    /// A vote cast by the account
    Vote {
        voter: String,
        id: ContentId,
        /// Signed weight in basis points
        weight: i32,
    },
    /// A curation reward paid to the account
    CurationReward {
        curator: String,
        id: ContentId,
        /// Reward amount (in the chain's vesting unit)
        reward: f64,
    },
}

impl HistoryOperation {
    pub fn content_id(&self) -> &ContentId {
        match self {
            HistoryOperation::Vote { id, .. } => id,
            HistoryOperation::CurationReward { id, .. } => id,
        }
    }
}

/// One entry of account history, keyed by its chain sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub operation: HistoryOperation,
}

/// Outcome of the schema check performed when a store is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaStatus {
    /// Store was already at the current version
    Current,
    /// Store was empty and has been stamped
    Created,
    /// Store was migrated in place from an older version
    Migrated { from: u32 },
    /// Store was unusable and has been destroyed and recreated
    Recreated { reason: String },
}
