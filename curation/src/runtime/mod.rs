//! Curator runtime
//!
//! Wires the store, engine, throttles and dispatcher to the external
//! collaborators and runs the actors:
//!
//! - ingestion: pulls chain events and creates tracking records
//! - dispatch: runs a dispatch cycle on a fixed interval
//! - resource refresh: polls the chain's resource level
//! - history (optional): stores the curating account's operation history
//!
//! # Shutdown
//!
//! [`CuratorHandle::shutdown`] cancels every actor, waits for them to
//! finish (an in-flight dispatch cycle completes its commit first), then
//! flushes the store.

pub mod actors;
pub mod ingest;

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::budget::{RateWindow, ResourceBudget};
use crate::config::{CuratorConfig, RuntimeSettings};
use crate::dispatch::{Dispatcher, FailureBreaker};
use crate::engine::CurationEngine;
use crate::external::{
    ActionExecutor, ContentFetcher, EventSource, HistorySource, ResourceLevelSource, SourceError,
};
use crate::policy::{ConfigError, ConfigResult, CurationPolicy, PolicyHandle};
use crate::state::{SharedTrackingStore, StoreError, TrackingStore};

pub use actors::{sync_history, HISTORY_BATCH, HISTORY_INITIAL_BATCH};
pub use ingest::{IngestOutcome, Ingestor};

/// Error type for the curator runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Actor {name} terminated abnormally: {reason}")]
    ActorFailed { name: &'static str, reason: String },
}

/// Result type for the curator runtime
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// External collaborators the actors run against.
pub struct Collaborators {
    pub events: Box<dyn EventSource>,
    pub executor: Arc<dyn ActionExecutor>,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub resource: Arc<dyn ResourceLevelSource>,
    pub history: Option<Arc<dyn HistorySource>>,
}

/// An opened curator, ready to be spawned.
pub struct Curator {
    settings: RuntimeSettings,
    store: SharedTrackingStore,
    engine: CurationEngine,
    budget: Arc<ResourceBudget>,
    rate_window: Arc<RateWindow>,
}

impl Curator {
    /// Validate `config`, open the store and build the decision components.
    pub fn open(config: &CuratorConfig) -> RuntimeResult<Self> {
        let policy = config.to_policy()?;
        let settings = config.runtime_settings()?;

        let store = TrackingStore::open(&settings.database_path)?;
        debug!(status = ?store.schema_status(), "Tracking store opened");
        let store = store.shared();

        let rate_window = Arc::new(RateWindow::open(
            settings.rate_window.clone(),
            Arc::clone(&store),
        )?);

        info!(
            tracked = store.tracked_count()?,
            authors = policy.authors().count(),
            delegates = policy.delegates().count(),
            "Curator opened"
        );

        Ok(Self {
            settings,
            store,
            engine: CurationEngine::new(PolicyHandle::new(policy)),
            budget: Arc::new(ResourceBudget::new()),
            rate_window,
        })
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn store(&self) -> &SharedTrackingStore {
        &self.store
    }

    pub fn engine(&self) -> &CurationEngine {
        &self.engine
    }

    pub fn budget(&self) -> &Arc<ResourceBudget> {
        &self.budget
    }

    pub fn rate_window(&self) -> &Arc<RateWindow> {
        &self.rate_window
    }

    /// Build the dispatcher for `executor` and `fetcher`.
    pub fn dispatcher(
        &self,
        executor: Arc<dyn ActionExecutor>,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(&self.store),
            self.engine.clone(),
            Arc::clone(&self.budget),
            Arc::clone(&self.rate_window),
            executor,
            fetcher,
        )
        .with_breaker(FailureBreaker::new(
            self.settings.executor_failure_threshold,
            self.settings.executor_cooldown,
        ))
    }

    /// Start every actor. Must be called from within a Tokio runtime.
    pub fn spawn(self, collaborators: Collaborators) -> CuratorHandle {
        let Collaborators {
            events,
            executor,
            fetcher,
            resource,
            history,
        } = collaborators;

        let cancel = CancellationToken::new();
        let dispatcher = Arc::new(self.dispatcher(executor, Arc::clone(&fetcher)));
        let ingestor = Ingestor::new(Arc::clone(&self.store), self.engine.clone(), fetcher);

        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = vec![
            (
                "ingestion",
                tokio::spawn(actors::run_ingestion(events, ingestor, cancel.clone())),
            ),
            (
                "resource-refresh",
                tokio::spawn(actors::run_resource_refresh(
                    resource,
                    Arc::clone(&self.budget),
                    self.settings.resource_refresh_interval,
                    cancel.clone(),
                )),
            ),
            (
                "dispatch",
                tokio::spawn(actors::run_dispatch(
                    Arc::clone(&dispatcher),
                    self.settings.dispatch_interval,
                    cancel.clone(),
                )),
            ),
        ];
        if let Some(source) = history {
            tasks.push((
                "history",
                tokio::spawn(actors::run_history(
                    Arc::clone(&self.store),
                    source,
                    self.settings.history_interval,
                    cancel.clone(),
                )),
            ));
        }

        info!(actors = tasks.len(), "Curator started");
        CuratorHandle {
            cancel,
            tasks,
            store: self.store,
            policy: self.engine.policy().clone(),
            budget: self.budget,
            rate_window: self.rate_window,
            dispatcher,
        }
    }
}

/// Handle to a running curator.
pub struct CuratorHandle {
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    store: SharedTrackingStore,
    policy: PolicyHandle,
    budget: Arc<ResourceBudget>,
    rate_window: Arc<RateWindow>,
    dispatcher: Arc<Dispatcher>,
}

impl CuratorHandle {
    /// Swap in a new policy snapshot. The next decision uses it.
    pub fn reload_policy(&self, policy: CurationPolicy) {
        self.policy.replace(policy);
        info!("Policy reloaded");
    }

    /// Build a policy from `config` and swap it in. Invalid configs leave
    /// the current policy in place.
    pub fn reload_config(&self, config: &CuratorConfig) -> ConfigResult<()> {
        let policy = config.to_policy()?;
        self.reload_policy(policy);
        Ok(())
    }

    pub fn store(&self) -> &SharedTrackingStore {
        &self.store
    }

    pub fn budget(&self) -> &Arc<ResourceBudget> {
        &self.budget
    }

    pub fn rate_window(&self) -> &Arc<RateWindow> {
        &self.rate_window
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Token that stops every actor when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop every actor, wait for them, then flush the store.
    pub async fn shutdown(self) -> RuntimeResult<()> {
        info!("Stopping curator");
        self.cancel.cancel();

        let mut failure = None;
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                error!(actor = name, error = %e, "Actor terminated abnormally");
                failure.get_or_insert(RuntimeError::ActorFailed {
                    name,
                    reason: e.to_string(),
                });
            }
        }

        self.store.flush()?;
        info!("Curator stopped");
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
