//! Sliding-window vote allotment
//!
//! Keeps the timestamps of recent votes and derives how much of the
//! per-window allotment is used. The ledger is persisted through the tracking
//! store after every change so restarts do not reset the limit.
//!
//! # Ledger format
//!
//! Concatenated big-endian `i64` unix seconds, oldest first. Eight bytes per
//! entry, no header.
//!
//! # Thread Safety
//!
//! Guarded by its own mutex, independent of the tracking store's lock.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::policy::{ConfigError, ConfigResult};
use crate::state::{SharedTrackingStore, StoreError, StoreResult};

const ENTRY_WIDTH: usize = 8;

/// Configuration for the rate window.
#[derive(Debug, Clone, PartialEq)]
pub struct RateWindowConfig {
    /// Entries older than this are pruned and not counted.
    pub window: Duration,

    /// Optional cap on retained entries; the oldest are evicted first.
    pub max_entries: Option<usize>,

    /// Votes allowed per window. Utilization is `count / allotment`.
    pub allotment: u32,
}

impl Default for RateWindowConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(24 * 60 * 60),
            max_entries: None,
            allotment: 20,
        }
    }
}

impl RateWindowConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.allotment == 0 {
            return Err(ConfigError::InvalidValue {
                key: "rate_window.allotment".to_string(),
                value: "0".to_string(),
                reason: "allotment must be at least 1".to_string(),
            });
        }
        if self.window.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "rate_window.window".to_string(),
                value: "0s".to_string(),
                reason: "window must be positive".to_string(),
            });
        }
        if self.max_entries == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "rate_window.max_entries".to_string(),
                value: "0".to_string(),
                reason: "max_entries must be at least 1 when set".to_string(),
            });
        }
        Ok(())
    }

    fn window_secs(&self) -> i64 {
        i64::try_from(self.window.as_secs()).unwrap_or(i64::MAX)
    }
}

/// Encode ledger entries in the persisted fixed-width format
pub fn encode_ledger(entries: &VecDeque<i64>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(entries.len() * ENTRY_WIDTH);
    for ts in entries {
        bytes.extend_from_slice(&ts.to_be_bytes());
    }
    bytes
}

/// Decode a persisted ledger. A trailing partial entry is ignored.
pub fn decode_ledger(bytes: &[u8]) -> VecDeque<i64> {
    let chunks = bytes.chunks_exact(ENTRY_WIDTH);
    if !chunks.remainder().is_empty() {
        warn!(
            len = bytes.len(),
            "Rate ledger has a trailing partial entry, ignoring it"
        );
    }
    let mut entries: Vec<i64> = chunks
        .map(|chunk| {
            let mut buf = [0u8; ENTRY_WIDTH];
            buf.copy_from_slice(chunk);
            i64::from_be_bytes(buf)
        })
        .collect();
    entries.sort_unstable();
    entries.into()
}

/// Sliding-window counter of recent vote times.
pub struct RateWindow {
    config: RateWindowConfig,
    ledger: Mutex<VecDeque<i64>>,
    store: Option<SharedTrackingStore>,
}

impl RateWindow {
    /// A window that is not persisted anywhere
    pub fn in_memory(config: RateWindowConfig) -> Self {
        Self {
            config,
            ledger: Mutex::new(VecDeque::new()),
            store: None,
        }
    }

    /// Load the persisted ledger from `store` and persist future changes to it.
    pub fn open(config: RateWindowConfig, store: SharedTrackingStore) -> StoreResult<Self> {
        let ledger = match store.rate_ledger()? {
            Some(bytes) => decode_ledger(&bytes),
            None => VecDeque::new(),
        };
        debug!(entries = ledger.len(), "Loaded rate window ledger");
        Ok(Self {
            config,
            ledger: Mutex::new(ledger),
            store: Some(store),
        })
    }

    pub fn config(&self) -> &RateWindowConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<i64>> {
        match self.ledger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn prune(&self, ledger: &mut VecDeque<i64>, now_secs: i64) {
        let cutoff = now_secs.saturating_sub(self.config.window_secs());
        while ledger.front().is_some_and(|ts| *ts <= cutoff) {
            ledger.pop_front();
        }
        if let Some(max) = self.config.max_entries {
            while ledger.len() > max {
                ledger.pop_front();
            }
        }
    }

    /// Append a vote time, prune, and persist the pruned ledger.
    pub fn record(&self, at: DateTime<Utc>) -> StoreResult<()> {
        let ts = at.timestamp();
        let mut ledger = self.ledger.lock().map_err(|_| StoreError::LockPoisoned)?;

        let position = ledger.partition_point(|existing| *existing <= ts);
        ledger.insert(position, ts);
        let newest = ledger.back().copied().unwrap_or(ts);
        self.prune(&mut ledger, newest);

        if let Some(store) = &self.store {
            store.put_rate_ledger(&encode_ledger(&ledger))?;
        }
        debug!(entries = ledger.len(), "Recorded vote in rate window");
        Ok(())
    }

    /// Number of recorded votes inside the window ending at `now`
    pub fn count_in_window(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now.timestamp().saturating_sub(self.config.window_secs());
        self.lock().iter().filter(|ts| **ts > cutoff).count()
    }

    /// `count_in_window / allotment`
    pub fn utilization_now(&self, now: DateTime<Utc>) -> f64 {
        self.utilization_with_pending(now, 0)
    }

    /// Utilization if `pending` more votes were recorded at `now`.
    pub fn utilization_with_pending(&self, now: DateTime<Utc>, pending: usize) -> f64 {
        (self.count_in_window(now) + pending) as f64 / f64::from(self.config.allotment.max(1))
    }

    /// Copy of the retained entries, oldest first
    pub fn entries(&self) -> Vec<i64> {
        self.lock().iter().copied().collect()
    }
}
