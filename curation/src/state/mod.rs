//! Persistent tracking state
//!
//! This module provides the RocksDB-backed [`TrackingStore`]:
//! - One lifecycle record per content identifier (`Tracked → Voted | Skipped`)
//! - An in-memory working set holding only actionable (`Tracked`) records
//! - The rate window ledger blob
//! - Account history items (votes and curation rewards)
//!
//! # Architecture
//!
//! Column families separate the data kinds inside one database:
//!
//! - `records`: TrackingRecord per identifier
//! - `history`: HistoryItem per account history sequence number
//! - `meta`: schema version marker and rate window ledger
//!
//! # Usage
//!
//! ```ignore
//! use curation::state::{TrackingStore, TrackingReason};
//!
//! let store = TrackingStore::open("./database")?;
//! if store.insert(&item, TrackingReason::author(&item.author))? {
//!     // first time this identifier has been seen
//! }
//! store.mark_voted(&[item.id.clone()])?;
//! ```

pub mod schema;
pub mod store;
pub mod types;

// Re-export core types
pub use store::{SharedTrackingStore, StoreError, StoreResult, TrackingStore};
pub use types::{
    HistoryItem, HistoryOperation, ReasonKind, RecordState, SchemaStatus, TrackingReason,
    TrackingRecord,
};
