//! Event ingestion
//!
//! Turns chain events into tracking records. Comments are tracked through
//! their author's rule; votes by a configured delegate cause the voted
//! content to be fetched and tracked through the delegate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::content::{ChainEvent, ContentItem, MalformedItem, VoteOperation};
use crate::engine::CurationEngine;
use crate::external::ContentFetcher;
use crate::state::{SharedTrackingStore, StoreResult, TrackingReason};

/// What happened to one ingested event.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// A new `Tracked` record was created
    Tracked(TrackingReason),
    /// A record already exists for the identifier
    AlreadyKnown,
    /// The tracking rules turned the item away
    Rejected(String),
    /// Not an event the curator reacts to
    Ignored,
    /// Required fields are missing
    Malformed(MalformedItem),
    /// The voted content could not be fetched
    Unavailable,
}

/// Applies the tracking rules to chain events.
#[derive(Clone)]
pub struct Ingestor {
    store: SharedTrackingStore,
    engine: CurationEngine,
    fetcher: Arc<dyn ContentFetcher>,
}

impl Ingestor {
    pub fn new(
        store: SharedTrackingStore,
        engine: CurationEngine,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Self {
        Self {
            store,
            engine,
            fetcher,
        }
    }

    /// Handle one event as of `now`. Only store failures are errors.
    pub async fn ingest(&self, event: ChainEvent, now: DateTime<Utc>) -> StoreResult<IngestOutcome> {
        match event {
            ChainEvent::Comment(item) => self.on_comment(item, now),
            ChainEvent::Vote(vote) => self.on_vote(vote, now).await,
        }
    }

    fn on_comment(&self, item: ContentItem, now: DateTime<Utc>) -> StoreResult<IngestOutcome> {
        if let Err(e) = item.validate() {
            debug!(identifier = %item.id, error = %e, "Invalid comment. Skipping");
            return Ok(IngestOutcome::Malformed(e));
        }
        let decision = self.engine.should_track_for_author(&item, now);
        if !decision.track {
            debug!(identifier = %item.id, reason = %decision.reason, "Not tracking comment");
            return Ok(IngestOutcome::Rejected(decision.reason));
        }
        self.track(&item, TrackingReason::author(&item.author))
    }

    async fn on_vote(&self, vote: VoteOperation, now: DateTime<Utc>) -> StoreResult<IngestOutcome> {
        let delegate = match self.engine.policy().current().delegate(&vote.voter) {
            Some(rule) => rule.name.clone(),
            None => return Ok(IngestOutcome::Ignored),
        };

        let id = vote.content_id();
        if self.store.get(&id)?.is_some() {
            return Ok(IngestOutcome::AlreadyKnown);
        }

        let item = match self.fetcher.fetch(&id).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                debug!(identifier = %id, delegate = %delegate, "Voted content not found");
                return Ok(IngestOutcome::Unavailable);
            }
            Err(e) => {
                warn!(identifier = %id, error = %e, "Failed to fetch voted content");
                return Ok(IngestOutcome::Unavailable);
            }
        };
        if let Err(e) = item.validate() {
            debug!(identifier = %id, error = %e, "Invalid comment. Skipping");
            return Ok(IngestOutcome::Malformed(e));
        }

        let decision = self.engine.should_track_for_delegate(&item, now);
        if !decision.track {
            debug!(identifier = %id, delegate = %delegate, reason = %decision.reason, "Not tracking voted content");
            return Ok(IngestOutcome::Rejected(decision.reason));
        }
        self.track(&item, TrackingReason::delegate(delegate))
    }

    fn track(&self, item: &ContentItem, reason: TrackingReason) -> StoreResult<IngestOutcome> {
        if self.store.insert(item, reason.clone())? {
            Ok(IngestOutcome::Tracked(reason))
        } else {
            Ok(IngestOutcome::AlreadyKnown)
        }
    }
}
