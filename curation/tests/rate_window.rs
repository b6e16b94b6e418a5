//! Rate window persistence across restarts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use curation::budget::rate_window::decode_ledger;
use curation::budget::{RateWindow, RateWindowConfig};
use curation::state::TrackingStore;

fn config() -> RateWindowConfig {
    RateWindowConfig {
        window: Duration::from_secs(24 * 60 * 60),
        max_entries: Some(3),
        allotment: 4,
    }
}

#[test]
fn restart_reproduces_entries_and_utilization() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");
    let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let now = base + chrono::Duration::minutes(30);

    let (entries, utilization) = {
        let store = TrackingStore::open(&path).unwrap().shared();
        let window = RateWindow::open(config(), Arc::clone(&store)).unwrap();
        for minutes in [0, 5, 10, 15] {
            window.record(base + chrono::Duration::minutes(minutes)).unwrap();
        }
        // One more than max_entries: the oldest was evicted.
        assert_eq!(window.entries().len(), 3);
        assert_eq!(window.entries()[0], (base + chrono::Duration::minutes(5)).timestamp());
        store.flush().unwrap();
        (window.entries(), window.utilization_now(now))
    };
    assert!((utilization - 0.75).abs() < f64::EPSILON);

    let store = TrackingStore::open(&path).unwrap().shared();
    let persisted = store.rate_ledger().unwrap().unwrap();
    assert_eq!(persisted.len(), 3 * 8);
    assert_eq!(Vec::from(decode_ledger(&persisted)), entries);

    let window = RateWindow::open(config(), store).unwrap();
    assert_eq!(window.entries(), entries);
    assert_eq!(window.utilization_now(now), utilization);
}

#[test]
fn entries_age_out_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");
    let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    {
        let store = TrackingStore::open(&path).unwrap().shared();
        let window = RateWindow::open(config(), store).unwrap();
        window.record(base).unwrap();
        window.record(base + chrono::Duration::hours(1)).unwrap();
    }

    let store = TrackingStore::open(&path).unwrap().shared();
    let window = RateWindow::open(config(), store).unwrap();
    let later = base + chrono::Duration::hours(24) + chrono::Duration::minutes(30);
    assert_eq!(window.count_in_window(later), 1);
    assert!((window.utilization_now(later) - 0.25).abs() < f64::EPSILON);
}
