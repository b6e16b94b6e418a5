//! Curation agent core
//!
//! This library decides which content items an unattended curator should
//! vote on, and makes sure each item is voted on at most once:
//! - Admission rules: author and delegate tables, blacklists, post age
//! - Throttling: a regenerating resource budget compared against per-tier
//!   priority thresholds, plus a sliding-window vote allotment
//! - A RocksDB tracking store with atomic batch transitions and schema
//!   versioning
//! - A dispatcher that absorbs the chain's "already voted" rejections
//!
//! The chain itself (RPC, block streaming, signing) stays behind the traits
//! in [`external`].
//!
//! # Usage
//!
//! ```ignore
//! use curation::{Collaborators, Curator, CuratorConfig};
//!
//! let config = CuratorConfig::load("curator-config.yaml")?;
//! let curator = Curator::open(&config)?;
//! let handle = curator.spawn(Collaborators {
//!     events,
//!     executor,
//!     fetcher,
//!     resource,
//!     history: None,
//! });
//! tokio::signal::ctrl_c().await?;
//! handle.shutdown().await?;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod budget;
pub mod config;
pub mod content;
pub mod dispatch;
pub mod engine;
pub mod external;
pub mod policy;
pub mod runtime;
pub mod state;

pub use budget::{RateWindow, RateWindowConfig, ResourceBudget};
pub use config::{ConfigFormat, CuratorConfig, RuntimeSettings};
pub use content::{ChainEvent, ContentId, ContentItem, MalformedItem, VoteOperation};
pub use dispatch::{CycleReport, DispatchError, Dispatcher};
pub use engine::{CurationEngine, ShouldTrack, ShouldVote, VoteContext};
pub use external::{
    is_duplicate_action_message, ActionExecutor, ActionOutcome, ContentFetcher, EventSource,
    ExecutorError, HistorySource, ResourceLevel, ResourceLevelSource, SourceError,
};
pub use policy::{
    AuthorRule, ConfigError, CurationPolicy, DelegateRule, PolicyHandle, PriorityThresholds,
    PriorityTier, ThresholdBoundary,
};
pub use runtime::{Collaborators, Curator, CuratorHandle, RuntimeError};
pub use state::{RecordState, StoreError, TrackingStore};
