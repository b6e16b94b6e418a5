//! End-to-end runs of the curator actors against in-memory collaborators.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use curation::config::{AuthorEntry, TimespanValue};
use curation::external::{
    ActionExecutor, ActionOutcome, ContentFetcher, EventSource, ExecutorError, HistorySource,
    ResourceLevel, ResourceLevelSource, SourceResult,
};
use curation::runtime::{sync_history, HISTORY_BATCH, HISTORY_INITIAL_BATCH};
use curation::state::{HistoryItem, HistoryOperation, RecordState, TrackingStore};
use curation::{ChainEvent, Collaborators, ContentId, ContentItem, Curator, CuratorConfig};
use tokio::sync::Notify;

struct QueuedEvents(VecDeque<ChainEvent>);

#[async_trait]
impl EventSource for QueuedEvents {
    async fn next_event(&mut self) -> SourceResult<Option<ChainEvent>> {
        Ok(self.0.pop_front())
    }
}

/// A stream that never produces anything.
struct SilentEvents;

#[async_trait]
impl EventSource for SilentEvents {
    async fn next_event(&mut self) -> SourceResult<Option<ChainEvent>> {
        std::future::pending::<()>().await;
        Ok(None)
    }
}

struct MapFetcher(HashMap<ContentId, ContentItem>);

#[async_trait]
impl ContentFetcher for MapFetcher {
    async fn fetch(&self, id: &ContentId) -> SourceResult<Option<ContentItem>> {
        Ok(self.0.get(id).cloned())
    }
}

#[derive(Default)]
struct RecordingExecutor(Mutex<Vec<(ContentId, f64)>>);

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn submit(&self, id: &ContentId, weight: f64) -> Result<ActionOutcome, ExecutorError> {
        self.0.lock().unwrap().push((id.clone(), weight));
        Ok(ActionOutcome::Applied)
    }
}

/// Holds every submission until released.
#[derive(Default)]
struct GatedExecutor {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl ActionExecutor for GatedExecutor {
    async fn submit(&self, _id: &ContentId, _weight: f64) -> Result<ActionOutcome, ExecutorError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(ActionOutcome::Applied)
    }
}

struct FixedLevel(f64);

#[async_trait]
impl ResourceLevelSource for FixedLevel {
    async fn query_level(&self) -> SourceResult<ResourceLevel> {
        Ok(ResourceLevel::Fraction(self.0))
    }
}

/// Serves a fixed account history and remembers the requested limits.
struct FakeHistory {
    items: Vec<HistoryItem>,
    limits: Mutex<Vec<u32>>,
}

#[async_trait]
impl HistorySource for FakeHistory {
    async fn account_history(&self, after: u64, limit: u32) -> SourceResult<Vec<HistoryItem>> {
        self.limits.lock().unwrap().push(limit);
        Ok(self
            .items
            .iter()
            .filter(|item| item.sequence > after)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

fn history_items(range: std::ops::RangeInclusive<u64>) -> Vec<HistoryItem> {
    range
        .map(|sequence| HistoryItem {
            sequence,
            timestamp: Utc::now(),
            operation: HistoryOperation::CurationReward {
                curator: "curator".to_string(),
                id: ContentId::new("alice", &format!("post-{}", sequence)),
                reward: 1.5,
            },
        })
        .collect()
}

fn fast_config(path: &Path) -> CuratorConfig {
    let fast = || Some(TimespanValue::Text("50ms".to_string()));
    CuratorConfig {
        database_path: path.to_path_buf(),
        authors: vec![AuthorEntry::Name("alice".to_string())],
        dispatch_interval: fast(),
        resource_refresh_interval: fast(),
        history_interval: fast(),
        ..CuratorConfig::default()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("curation=debug").try_init();
}

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

#[tokio::test]
async fn ingested_post_is_voted_once_and_survives_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");
    let post = ContentItem::new("alice", "launch", "news", Utc::now() - ChronoDuration::minutes(10));
    let ignored = ContentItem::new("mallory", "spam", "news", Utc::now() - ChronoDuration::minutes(10));

    let executor = Arc::new(RecordingExecutor::default());
    let history = Arc::new(FakeHistory {
        items: history_items(1..=3),
        limits: Mutex::new(Vec::new()),
    });
    let curator = Curator::open(&fast_config(&path)).unwrap();
    let handle = curator.spawn(Collaborators {
        events: Box::new(QueuedEvents(VecDeque::from(vec![
            ChainEvent::Comment(post.clone()),
            ChainEvent::Comment(ignored.clone()),
        ]))),
        executor: executor.clone(),
        fetcher: Arc::new(MapFetcher(HashMap::from([(post.id.clone(), post.clone())]))),
        resource: Arc::new(FixedLevel(1.0)),
        history: Some(history.clone()),
    });

    let store = Arc::clone(handle.store());
    let voted = wait_for(|| {
        matches!(store.get(&post.id), Ok(Some(record)) if record.state == RecordState::Voted)
    })
    .await;
    assert!(voted, "post was never voted on");
    assert!(wait_for(|| store.history().map(|h| h.len()).unwrap_or(0) == 3).await);
    assert!(store.get(&ignored.id).unwrap().is_none());
    drop(store);

    // Let a few more cycles run; the vote must not be repeated.
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(*executor.0.lock().unwrap(), vec![(post.id.clone(), 100.0)]);
    let limits = history.limits.lock().unwrap().clone();
    assert_eq!(limits[0], HISTORY_INITIAL_BATCH);

    let store = TrackingStore::open(&path).unwrap();
    assert_eq!(store.get(&post.id).unwrap().unwrap().state, RecordState::Voted);
    assert_eq!(store.tracked_count().unwrap(), 0);
    assert_eq!(store.curation_rewards().unwrap().len(), 3);
}

#[tokio::test]
async fn shutdown_interrupts_idle_actors() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let curator = Curator::open(&fast_config(&dir.path().join("db"))).unwrap();
    let handle = curator.spawn(Collaborators {
        events: Box::new(SilentEvents),
        executor: Arc::new(RecordingExecutor::default()),
        fetcher: Arc::new(MapFetcher(HashMap::new())),
        resource: Arc::new(FixedLevel(0.5)),
        history: None,
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .expect("shutdown hung")
        .unwrap();
}

#[tokio::test]
async fn shutdown_lets_in_flight_cycle_commit() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");
    let post = ContentItem::new("alice", "slow", "news", Utc::now() - ChronoDuration::minutes(10));

    let executor = Arc::new(GatedExecutor::default());
    let curator = Curator::open(&fast_config(&path)).unwrap();
    let handle = curator.spawn(Collaborators {
        events: Box::new(QueuedEvents(VecDeque::from(vec![ChainEvent::Comment(post.clone())]))),
        executor: executor.clone(),
        fetcher: Arc::new(MapFetcher(HashMap::from([(post.id.clone(), post.clone())]))),
        resource: Arc::new(FixedLevel(1.0)),
        history: None,
    });

    tokio::time::timeout(Duration::from_secs(5), executor.entered.notified())
        .await
        .expect("vote was never submitted");
    let shutdown = tokio::spawn(handle.shutdown());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!shutdown.is_finished(), "shutdown did not wait for the cycle");

    executor.release.notify_one();
    tokio::time::timeout(Duration::from_secs(5), shutdown)
        .await
        .expect("shutdown hung")
        .unwrap()
        .unwrap();

    let store = TrackingStore::open(&path).unwrap();
    assert_eq!(store.get(&post.id).unwrap().unwrap().state, RecordState::Voted);
    assert_eq!(store.tracked_count().unwrap(), 0);
}

#[tokio::test]
async fn reloaded_policy_applies_to_tracked_items() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config(&dir.path().join("db"));
    let curator = Curator::open(&config).unwrap();

    let post = ContentItem::new("alice", "later", "news", Utc::now() - ChronoDuration::minutes(10));
    let handle = curator.spawn(Collaborators {
        events: Box::new(QueuedEvents(VecDeque::from(vec![ChainEvent::Comment(post.clone())]))),
        executor: Arc::new(RecordingExecutor::default()),
        fetcher: Arc::new(MapFetcher(HashMap::from([(post.id.clone(), post.clone())]))),
        // Below every threshold, so the item waits in the working set.
        resource: Arc::new(FixedLevel(0.5)),
        history: None,
    });

    let store = Arc::clone(handle.store());
    assert!(wait_for(|| store.get(&post.id).map(|r| r.is_some()).unwrap_or(false)).await);

    config.blacklist_authors = vec!["alice".to_string()];
    handle.reload_config(&config).unwrap();
    handle.dispatcher().run_cycle().await.unwrap();
    assert_eq!(store.get(&post.id).unwrap().unwrap().state, RecordState::Skipped);

    drop(store);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn history_sync_requests_incremental_batches() {
    let dir = tempfile::tempdir().unwrap();
    let store = TrackingStore::open(dir.path().join("db")).unwrap().shared();
    let source = FakeHistory {
        items: history_items(1..=4),
        limits: Mutex::new(Vec::new()),
    };

    assert_eq!(sync_history(&store, &source).await.unwrap(), 4);
    assert_eq!(store.highest_history_sequence().unwrap(), 4);
    assert_eq!(sync_history(&store, &source).await.unwrap(), 0);
    assert_eq!(
        *source.limits.lock().unwrap(),
        vec![HISTORY_INITIAL_BATCH, HISTORY_BATCH]
    );
}
