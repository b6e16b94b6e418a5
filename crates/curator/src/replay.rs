//! Offline collaborators for replaying recorded chain events.
//!
//! Events are read as JSON lines (one [`ChainEvent`] per line). Every
//! comment seen is cached so the dispatcher and the delegate path can
//! "fetch" it later, and votes are folded into the cached item's voter list.
//! Nothing is broadcast: the dry-run executor only logs what it would do.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use curation::external::SourceResult;
use curation::{
    ActionExecutor, ActionOutcome, ChainEvent, ContentFetcher, ContentId, ContentItem,
    EventSource, ExecutorError, ResourceLevel, ResourceLevelSource, SourceError,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::{debug, info};

/// Latest snapshot of every item seen in the replayed stream.
#[derive(Clone, Default)]
pub struct ContentCache {
    items: Arc<RwLock<HashMap<ContentId, ContentItem>>>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an event into the cache.
    pub fn observe(&self, event: &ChainEvent) {
        let Ok(mut items) = self.items.write() else {
            return;
        };
        match event {
            ChainEvent::Comment(item) => {
                // Edits keep the voters collected so far.
                let voters = items
                    .get(&item.id)
                    .map(|existing| existing.active_voters.clone())
                    .unwrap_or_default();
                let mut item = item.clone();
                for voter in voters {
                    if !item.has_voter(&voter) {
                        item.active_voters.push(voter);
                    }
                }
                items.insert(item.id.clone(), item);
            }
            ChainEvent::Vote(vote) => {
                if let Some(item) = items.get_mut(&vote.content_id()) {
                    if !item.has_voter(&vote.voter) {
                        item.active_voters.push(vote.voter.clone());
                    }
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentFetcher for ContentCache {
    async fn fetch(&self, id: &ContentId) -> SourceResult<Option<ContentItem>> {
        let items = self
            .items
            .read()
            .map_err(|_| SourceError::Unavailable("content cache lock poisoned".to_string()))?;
        Ok(items.get(id).cloned())
    }
}

/// Chain events read from JSON lines.
pub struct JsonLinesEvents<R> {
    lines: Lines<R>,
    cache: ContentCache,
    line_number: usize,
}

impl<R> JsonLinesEvents<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R, cache: ContentCache) -> Self {
        Self {
            lines: reader.lines(),
            cache,
            line_number: 0,
        }
    }
}

#[async_trait]
impl<R> EventSource for JsonLinesEvents<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_event(&mut self) -> SourceResult<Option<ChainEvent>> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            self.line_number += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let event: ChainEvent = serde_json::from_str(line).map_err(|e| {
                SourceError::Decode(format!("line {}: {}", self.line_number, e))
            })?;
            self.cache.observe(&event);
            return Ok(Some(event));
        }
    }
}

/// Logs votes instead of broadcasting them.
#[derive(Default)]
pub struct DryRunExecutor {
    submitted: Mutex<HashSet<ContentId>>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> usize {
        self.submitted.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    async fn submit(&self, id: &ContentId, weight: f64) -> Result<ActionOutcome, ExecutorError> {
        let mut submitted = self
            .submitted
            .lock()
            .map_err(|_| ExecutorError::Transport("dry-run ledger lock poisoned".to_string()))?;
        if !submitted.insert(id.clone()) {
            debug!(identifier = %id, "Dry run: vote already cast");
            return Ok(ActionOutcome::AlreadyDone);
        }
        info!(identifier = %id, weight, "Dry run: would vote");
        Ok(ActionOutcome::Applied)
    }
}

/// Reports the same resource level on every query.
pub struct FixedResourceLevel(pub f64);

#[async_trait]
impl ResourceLevelSource for FixedResourceLevel {
    async fn query_level(&self) -> SourceResult<ResourceLevel> {
        Ok(ResourceLevel::Fraction(self.0))
    }
}
