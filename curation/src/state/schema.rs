//! Column family and key layout for the RocksDB tracking store
//!
//! Each column family separates one kind of data while sharing a single
//! RocksDB instance. Keys are ASCII so that prefix scans and lexicographic
//! ordering match the logical ordering.

/// Column family for tracking records, one per content identifier
pub const CF_RECORDS: &str = "records";

/// Column family for account history items
pub const CF_HISTORY: &str = "history";

/// Column family for the schema marker and the rate window ledger
pub const CF_META: &str = "meta";

/// All column family names
pub const ALL_CFS: &[&str] = &[CF_RECORDS, CF_HISTORY, CF_META];

/// Current schema version written by this build.
pub const SCHEMA_VERSION: u32 = 2;

/// Oldest schema version that can be migrated in place.
pub const MIN_MIGRATABLE_VERSION: u32 = 1;

/// Key prefixes for compound keys
pub mod keys {
    use crate::content::ContentId;

    /// Prefix shared by every tracking record key
    pub const RECORD_PREFIX: &str = "post:";

    /// Prefix shared by every history key
    pub const HISTORY_PREFIX: &str = "hist:";

    /// Schema marker key in the meta column family
    pub const SCHEMA_VERSION: &str = "schema-version";

    /// Rate window ledger key in the meta column family
    pub const RATE_LEDGER: &str = "rate-ledger";

    /// Create a tracking record key
    pub fn record(id: &ContentId) -> String {
        format!("{}{}", RECORD_PREFIX, id)
    }

    /// Extract the identifier from a tracking record key
    pub fn parse_record(key: &str) -> Option<ContentId> {
        let raw = key.strip_prefix(RECORD_PREFIX)?;
        ContentId::parse(raw).ok()
    }

    /// Create a history key (zero-padded so keys sort by sequence)
    pub fn history(sequence: u64) -> String {
        format!("{}{:020}", HISTORY_PREFIX, sequence)
    }

    /// Parse the sequence number from a history key
    pub fn parse_history(key: &str) -> Option<u64> {
        key.strip_prefix(HISTORY_PREFIX)?.parse().ok()
    }
}

/// Single-byte value tags written by schema version 1.
///
/// Version 1 stored only a tag per identifier. `0` predates the explicit
/// tags and meant "tracked"; migration rewrites it.
pub mod legacy {
    pub const UNTAGGED: u8 = b'0';
    pub const VOTED: u8 = b'1';
    pub const TRACKED: u8 = b'2';
    pub const SKIPPED: u8 = b'3';
}
