//! Tests for the in-memory store
//!
//! These tests verify:
//! - Range splitting and descriptor lookups
//! - RangeKeyMismatch on spans crossing a range end
//! - Atomic ingestion and shadowing checks
//! - Fault injection knobs

use std::time::{Duration, SystemTime};

use bytes::Bytes;
use sstbatch::sst::SstWriter;
use sstbatch::stats::MvccStats;
use sstbatch::{AddSstableRequest, BulkError, IngestStore, MemStore, RangeDescriptorCache};

// =============================================================================
// Helper Functions
// =============================================================================

fn sst(entries: &[(&str, &str)]) -> Bytes {
    let mut writer = SstWriter::new();
    for (k, v) in entries {
        writer.put(k.as_bytes(), v.as_bytes()).unwrap();
    }
    writer.finish().unwrap()
}

fn request(start: &str, end: &str, data: Bytes) -> AddSstableRequest {
    AddSstableRequest {
        start: start.as_bytes().to_vec(),
        end: end.as_bytes().to_vec(),
        data,
        disallow_shadowing: false,
        stats: None,
        ingest_as_writes: false,
        log_logical_op: false,
    }
}

fn later() -> SystemTime {
    SystemTime::now() + Duration::from_secs(60)
}

// =============================================================================
// Range Tests
// =============================================================================

#[test]
fn test_store_starts_with_one_range() {
    let store = MemStore::new();

    assert_eq!(store.range_count(), 1);
    let desc = store.get_cached_range_descriptor(b"anything", false).unwrap().unwrap();
    assert_eq!(desc.end_key, None);
}

#[test]
fn test_split_at_creates_ranges() {
    let store = MemStore::with_splits(["g", "p"]);

    assert_eq!(store.range_count(), 3);
    assert_eq!(store.split_keys(), vec![b"g".to_vec(), b"p".to_vec()]);

    let desc = store.get_cached_range_descriptor(b"h", false).unwrap().unwrap();
    assert_eq!(desc.start_key, b"g".to_vec());
    assert_eq!(desc.end_key, Some(b"p".to_vec()));

    // Splitting at an existing boundary is a no-op
    assert!(!store.split_at(b"g"));
    assert_eq!(store.range_count(), 3);
}

// =============================================================================
// Ingestion Tests
// =============================================================================

#[test]
fn test_ingest_within_range() {
    let store = MemStore::with_splits(["m"]);

    store
        .add_sstable(request("a", "c", sst(&[("a", "1"), ("b", "2")])))
        .unwrap();

    assert_eq!(store.get(b"a"), Some(b"1".to_vec()));
    assert_eq!(store.len(), 2);
    let ingested = store.ingested();
    assert_eq!(ingested.len(), 1);
    assert_eq!(ingested[0].entries, 2);
}

#[test]
fn test_ingest_across_range_end_is_mismatch() {
    let store = MemStore::with_splits(["m"]);

    let err = store
        .add_sstable(request("a", "z", sst(&[("a", "1"), ("x", "2")])))
        .unwrap_err();

    match err {
        BulkError::RangeKeyMismatch { split_key, range_start } => {
            assert_eq!(split_key, b"m".to_vec());
            assert!(range_start.is_empty());
        }
        other => panic!("expected RangeKeyMismatch, got {:?}", other),
    }
    // Nothing applied
    assert!(store.is_empty());
}

#[test]
fn test_ingest_rejects_keys_outside_span() {
    let store = MemStore::new();

    let err = store
        .add_sstable(request("b", "c", sst(&[("a", "1")])))
        .unwrap_err();
    assert!(matches!(err, BulkError::Ingestion(_)));
}

#[test]
fn test_ingest_checks_stats() {
    let store = MemStore::new();
    let mut req = request("a", "c", sst(&[("a", "1"), ("b", "2")]));
    req.stats = Some(MvccStats {
        key_count: 5,
        ..MvccStats::default()
    });

    assert!(matches!(store.add_sstable(req), Err(BulkError::Ingestion(_))));
}

#[test]
fn test_disallow_shadowing() {
    let store = MemStore::new();
    store.add_sstable(request("a", "b", sst(&[("a", "1")]))).unwrap();

    // Identical value is fine
    let mut same = request("a", "b", sst(&[("a", "1")]));
    same.disallow_shadowing = true;
    store.add_sstable(same).unwrap();

    // Different value collides, and nothing in the SST is applied
    let mut different = request("a", "d", sst(&[("a", "2"), ("c", "3")]));
    different.disallow_shadowing = true;
    assert!(matches!(
        store.add_sstable(different),
        Err(BulkError::Ingestion(_))
    ));
    assert_eq!(store.get(b"a"), Some(b"1".to_vec()));
    assert_eq!(store.get(b"c"), None);
}

// =============================================================================
// Fault Injection Tests
// =============================================================================

#[test]
fn test_inject_ambiguous() {
    let store = MemStore::new();
    store.inject_ambiguous(2);

    for _ in 0..2 {
        assert!(matches!(
            store.add_sstable(request("a", "b", sst(&[("a", "1")]))),
            Err(BulkError::AmbiguousResult(_))
        ));
    }
    store.add_sstable(request("a", "b", sst(&[("a", "1")]))).unwrap();
}

#[test]
fn test_split_and_scatter() {
    let store = MemStore::new();

    store.split_and_scatter(b"k", later()).unwrap();
    assert_eq!(store.split_keys(), vec![b"k".to_vec()]);
    assert_eq!(store.split_requests(), vec![b"k".to_vec()]);

    store.fail_split_scatter(true);
    assert!(matches!(
        store.split_and_scatter(b"q", later()),
        Err(BulkError::SplitScatter(_))
    ));
    assert_eq!(store.range_count(), 2);
}
