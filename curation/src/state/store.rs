//! RocksDB-backed tracking store
//!
//! Durable map from content identifier to lifecycle state. The in-memory
//! working set holds only `Tracked` records; terminal records live on disk
//! so that a second insert for the same identifier stays a no-op forever.
//!
//! Every mutation runs inside one store-wide mutex. Check-then-insert and
//! batch transitions are single critical sections, and batch transitions
//! are committed with one RocksDB `WriteBatch`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::schema::{self, keys, ALL_CFS, CF_HISTORY, CF_META, CF_RECORDS};
use super::types::*;
use crate::content::{ContentId, ContentItem};

/// Error type for tracking store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    #[error("Stored schema version {found} is newer than supported version {supported}")]
    IncompatibleSchema { found: u32, supported: u32 },
}

/// Result type for tracking store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to TrackingStore
pub type SharedTrackingStore = Arc<TrackingStore>;

/// What the schema marker says about an opened database.
enum VersionCheck {
    Current,
    Empty,
    Migrate(u32),
    Recreate(String),
    Newer(u32),
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| StoreError::Deserialization(e.to_string()))
}

fn cf_handle<'a>(db: &'a DB, name: &str) -> StoreResult<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| StoreError::ColumnFamilyNotFound(name.to_string()))
}

fn open_db(path: &Path) -> StoreResult<DB> {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);

    let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
        .iter()
        .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
        .collect();

    Ok(DB::open_cf_descriptors(&opts, path, cf_descriptors)?)
}

/// Collect every `(key, value)` pair under `prefix` in a column family.
fn scan_prefix(db: &DB, cf_name: &str, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
    let cf = cf_handle(db, cf_name)?;
    let mut entries = Vec::new();

    for result in db.prefix_iterator_cf(cf, prefix.as_bytes()) {
        let (key, value) = result?;
        match String::from_utf8(key.to_vec()) {
            Ok(key_str) if key_str.starts_with(prefix) => entries.push((key_str, value.to_vec())),
            Ok(_) => break, // Prefix no longer matches
            Err(_) => continue,
        }
    }

    Ok(entries)
}

/// Durable, lock-protected tracking store
pub struct TrackingStore {
    db: DB,
    path: PathBuf,
    /// Working set of `Tracked` records. Its mutex is the store-wide lock.
    tracked: Mutex<HashMap<ContentId, TrackingRecord>>,
    schema_status: SchemaStatus,
}

impl TrackingStore {
    /// Open or create a store at the given path, migrating older schemas.
    ///
    /// Fails with [`StoreError::IncompatibleSchema`] if the stored version is
    /// newer than this build understands. Stores that cannot be recovered are
    /// destroyed and recreated.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let mut db = open_db(&path)?;

        let schema_status = match Self::check_version(&db)? {
            VersionCheck::Current => SchemaStatus::Current,
            VersionCheck::Empty => {
                Self::stamp_version(&db)?;
                info!(path = %path.display(), version = schema::SCHEMA_VERSION, "Created tracking store");
                SchemaStatus::Created
            }
            VersionCheck::Migrate(from) => {
                info!(from, to = schema::SCHEMA_VERSION, "Migrating tracking store schema");
                Self::migrate(&db, from)?;
                SchemaStatus::Migrated { from }
            }
            VersionCheck::Recreate(reason) => {
                warn!(path = %path.display(), %reason, "Incompatible or unreadable store. Creating new store");
                drop(db);
                DB::destroy(&Options::default(), &path)?;
                db = open_db(&path)?;
                Self::stamp_version(&db)?;
                SchemaStatus::Recreated { reason }
            }
            VersionCheck::Newer(found) => {
                return Err(StoreError::IncompatibleSchema {
                    found,
                    supported: schema::SCHEMA_VERSION,
                });
            }
        };

        let store = Self {
            db,
            path,
            tracked: Mutex::new(HashMap::new()),
            schema_status,
        };
        store.load()?;
        Ok(store)
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedTrackingStore {
        Arc::new(self)
    }

    /// Get the database path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// What happened to the schema when this store was opened
    pub fn schema_status(&self) -> &SchemaStatus {
        &self.schema_status
    }

    /// Read the stored schema marker, if any
    pub fn schema_version(&self) -> StoreResult<Option<u32>> {
        let cf = cf_handle(&self.db, CF_META)?;
        match self.db.get_cf(cf, keys::SCHEMA_VERSION)? {
            Some(bytes) => Ok(std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.trim().parse().ok())),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Schema versioning
    // =========================================================================

    fn check_version(db: &DB) -> StoreResult<VersionCheck> {
        let meta = cf_handle(db, CF_META)?;
        let marker = match db.get_cf(meta, keys::SCHEMA_VERSION)? {
            Some(marker) => marker,
            None => {
                let records = cf_handle(db, CF_RECORDS)?;
                let has_data = db.iterator_cf(records, IteratorMode::Start).next().is_some();
                return Ok(if has_data {
                    VersionCheck::Recreate("store predates schema versioning".to_string())
                } else {
                    VersionCheck::Empty
                });
            }
        };

        let version = match std::str::from_utf8(&marker)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
        {
            Some(version) => version,
            None => {
                return Ok(VersionCheck::Recreate(format!(
                    "unreadable schema marker {:?}",
                    String::from_utf8_lossy(&marker)
                )))
            }
        };

        Ok(if version == schema::SCHEMA_VERSION {
            VersionCheck::Current
        } else if version > schema::SCHEMA_VERSION {
            VersionCheck::Newer(version)
        } else if version >= schema::MIN_MIGRATABLE_VERSION {
            VersionCheck::Migrate(version)
        } else {
            VersionCheck::Recreate(format!("schema version {} is too old to migrate", version))
        })
    }

    fn stamp_version(db: &DB) -> StoreResult<()> {
        let meta = cf_handle(db, CF_META)?;
        db.put_cf(meta, keys::SCHEMA_VERSION, schema::SCHEMA_VERSION.to_string())?;
        Ok(())
    }

    /// Rewrite v1 single-byte tags into full records, in one batch with the new marker.
    fn migrate(db: &DB, from: u32) -> StoreResult<()> {
        let records = cf_handle(db, CF_RECORDS)?;
        let meta = cf_handle(db, CF_META)?;
        let mut batch = WriteBatch::default();
        let mut rewritten = 0usize;

        for (key, value) in scan_prefix(db, CF_RECORDS, keys::RECORD_PREFIX)? {
            if value.len() != 1 {
                continue;
            }
            let Some(id) = keys::parse_record(&key) else {
                warn!(key = %key, "Dropping legacy record with unparseable key");
                batch.delete_cf(records, key.as_bytes());
                continue;
            };
            let Some(state) = RecordState::from_legacy_tag(value[0]) else {
                warn!(identifier = %id, tag = value[0], "Dropping legacy record with unknown tag");
                batch.delete_cf(records, key.as_bytes());
                continue;
            };

            let mut record = TrackingRecord::new(id.clone(), TrackingReason::author(id.author()));
            record.state = state;
            batch.put_cf(records, key.as_bytes(), encode(&record)?);
            rewritten += 1;
        }

        batch.put_cf(meta, keys::SCHEMA_VERSION, schema::SCHEMA_VERSION.to_string());
        db.write(batch)?;
        info!(from, rewritten, "Tracking store migrated");
        Ok(())
    }

    // =========================================================================
    // Tracking records
    // =========================================================================

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<ContentId, TrackingRecord>>> {
        self.tracked.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Poison the working-set lock so every later transition fails.
    #[cfg(test)]
    pub(crate) fn poison_working_set(&self) {
        let _ = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = self.tracked.lock();
                    panic!("working set poisoned for a test");
                })
                .join()
        });
    }

    fn read_record(&self, id: &ContentId) -> StoreResult<Option<TrackingRecord>> {
        let cf = cf_handle(&self.db, CF_RECORDS)?;
        match self.db.get_cf(cf, keys::record(id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Rebuild the in-memory working set from disk. Terminal records stay on disk.
    ///
    /// Returns the number of `Tracked` records loaded.
    pub fn load(&self) -> StoreResult<usize> {
        let entries = scan_prefix(&self.db, CF_RECORDS, keys::RECORD_PREFIX)?;
        let mut tracked = self.lock()?;
        tracked.clear();

        for (_, value) in entries {
            let record: TrackingRecord = decode(&value)?;
            if record.is_tracked() {
                tracked.insert(record.id.clone(), record);
            }
        }

        debug!(count = tracked.len(), "Loaded tracked records");
        Ok(tracked.len())
    }

    /// Start tracking `item`. Returns `false` without writing if any record
    /// (tracked, voted or skipped) already exists for its identifier.
    pub fn insert(&self, item: &ContentItem, reason: TrackingReason) -> StoreResult<bool> {
        let mut tracked = self.lock()?;
        let cf = cf_handle(&self.db, CF_RECORDS)?;
        let key = keys::record(&item.id);

        if tracked.contains_key(&item.id) || self.db.get_cf(cf, &key)?.is_some() {
            return Ok(false);
        }

        let record = TrackingRecord::new(item.id.clone(), reason);
        self.db.put_cf(cf, &key, encode(&record)?)?;
        info!(identifier = %item.id, reason = %record.reason, "Added");
        tracked.insert(item.id.clone(), record);
        Ok(true)
    }

    /// Transition every listed `Tracked` identifier to `Voted` in one batch.
    ///
    /// Identifiers that are not currently tracked are ignored. Returns the
    /// number of records transitioned.
    pub fn mark_voted(&self, ids: &[ContentId]) -> StoreResult<usize> {
        self.transition(ids, RecordState::Voted)
    }

    /// Transition every listed `Tracked` identifier to `Skipped` in one batch.
    pub fn mark_skipped(&self, ids: &[ContentId]) -> StoreResult<usize> {
        self.transition(ids, RecordState::Skipped)
    }

    fn transition(&self, ids: &[ContentId], target: RecordState) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tracked = self.lock()?;
        let cf = cf_handle(&self.db, CF_RECORDS)?;
        let mut batch = WriteBatch::default();
        let mut moved: HashSet<ContentId> = HashSet::new();

        for id in ids {
            if moved.contains(id) {
                continue;
            }
            let current = match tracked.get(id) {
                Some(record) => Some(record.clone()),
                None => self.read_record(id)?,
            };
            if let Some(mut record) = current.filter(TrackingRecord::is_tracked) {
                record.state = target;
                batch.put_cf(cf, keys::record(id), encode(&record)?);
                moved.insert(id.clone());
            }
        }

        if moved.is_empty() {
            return Ok(0);
        }

        self.db.write(batch)?;
        for id in &moved {
            tracked.remove(id);
        }
        info!(count = moved.len(), state = %target, "Updated tracked records");
        Ok(moved.len())
    }

    /// Snapshot of all `Tracked` records, oldest first.
    pub fn list_tracked(&self) -> StoreResult<Vec<TrackingRecord>> {
        let tracked = self.lock()?;
        let mut records: Vec<TrackingRecord> = tracked.values().cloned().collect();
        drop(tracked);
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    /// Number of records in the working set
    pub fn tracked_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.len())
    }

    /// Read the durable record for `id`, in any state.
    pub fn get(&self, id: &ContentId) -> StoreResult<Option<TrackingRecord>> {
        self.read_record(id)
    }

    // =========================================================================
    // Rate window ledger
    // =========================================================================

    /// Read the persisted rate window ledger blob
    pub fn rate_ledger(&self) -> StoreResult<Option<Vec<u8>>> {
        let cf = cf_handle(&self.db, CF_META)?;
        Ok(self.db.get_cf(cf, keys::RATE_LEDGER)?)
    }

    /// Replace the persisted rate window ledger blob
    pub fn put_rate_ledger(&self, ledger: &[u8]) -> StoreResult<()> {
        let cf = cf_handle(&self.db, CF_META)?;
        self.db.put_cf(cf, keys::RATE_LEDGER, ledger)?;
        Ok(())
    }

    // =========================================================================
    // Account history
    // =========================================================================

    /// Store history items in one batch. Items are keyed by sequence, so
    /// storing the same item twice overwrites it.
    pub fn put_history(&self, items: &[HistoryItem]) -> StoreResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let cf = cf_handle(&self.db, CF_HISTORY)?;
        let mut batch = WriteBatch::default();
        for item in items {
            batch.put_cf(cf, keys::history(item.sequence), encode(item)?);
        }
        self.db.write(batch)?;
        debug!(count = items.len(), "Stored account history");
        Ok(items.len())
    }

    /// Highest stored history sequence number, or 0 when none is stored.
    pub fn highest_history_sequence(&self) -> StoreResult<u64> {
        let cf = cf_handle(&self.db, CF_HISTORY)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(result) => {
                let (key, _) = result?;
                let key_str = String::from_utf8_lossy(&key);
                Ok(keys::parse_history(&key_str).unwrap_or(0))
            }
            None => Ok(0),
        }
    }

    /// All stored history items ordered by sequence
    pub fn history(&self) -> StoreResult<Vec<HistoryItem>> {
        scan_prefix(&self.db, CF_HISTORY, keys::HISTORY_PREFIX)?
            .into_iter()
            .map(|(_, value)| decode(&value))
            .collect()
    }

    /// Total curation reward earned per identifier
    pub fn curation_rewards(&self) -> StoreResult<BTreeMap<ContentId, f64>> {
        let mut rewards = BTreeMap::new();
        for item in self.history()? {
            if let HistoryOperation::CurationReward { id, reward, .. } = item.operation {
                *rewards.entry(id).or_insert(0.0) += reward;
            }
        }
        Ok(rewards)
    }

    /// Flush memtables of every column family to disk
    pub fn flush(&self) -> StoreResult<()> {
        for name in ALL_CFS {
            self.db.flush_cf(cf_handle(&self.db, name)?)?;
        }
        Ok(())
    }
}
