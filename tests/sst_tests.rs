//! Tests for the in-memory SST codec
//!
//! These tests verify:
//! - SST creation and data size accounting
//! - O(log n) key lookups via the index
//! - Seekable cursor behaviour
//! - Writer misuse (ordering, put after finish/close)
//! - Payload validation (magic, checksum, truncation)

use bytes::Bytes;
use sstbatch::sst::{SstReader, SstWriter};
use sstbatch::BulkError;

// =============================================================================
// Helper Functions
// =============================================================================

/// Create an SST payload with numbered entries
fn create_sst_with_entries(count: usize) -> Bytes {
    let mut writer = SstWriter::new();
    // Keys must be added in sorted order
    for i in 0..count {
        let key = format!("key{:05}", i); // Zero-padded for lexicographic order
        let value = format!("value{}", i);
        writer.put(key.as_bytes(), value.as_bytes()).unwrap();
    }
    writer.finish().unwrap()
}

fn collect(reader: &SstReader, from: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut iter = reader.iter();
    iter.seek_ge(from);
    let mut out = Vec::new();
    while iter.valid().unwrap() {
        out.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.next();
    }
    out
}

// =============================================================================
// SstWriter Tests
// =============================================================================

#[test]
fn test_writer_tracks_data_size() {
    let mut writer = SstWriter::new();
    assert_eq!(writer.data_size(), 0);
    assert!(writer.is_empty());

    writer.put(b"abc", b"12345").unwrap();
    // 8 bytes of framing + key + value
    assert_eq!(writer.data_size(), 8 + 3 + 5);

    writer.put(b"abd", b"").unwrap();
    assert_eq!(writer.data_size(), 16 + 8 + 3);
    assert_eq!(writer.entry_count(), 2);
}

#[test]
fn test_writer_rejects_unsorted_keys() {
    let mut writer = SstWriter::new();
    writer.put(b"b", b"1").unwrap();

    assert!(matches!(writer.put(b"a", b"2"), Err(BulkError::Writer(_))));
    assert!(matches!(writer.put(b"b", b"2"), Err(BulkError::Writer(_))));
    assert_eq!(writer.entry_count(), 1);
}

#[test]
fn test_writer_unusable_after_finish() {
    let mut writer = SstWriter::new();
    writer.put(b"a", b"1").unwrap();
    writer.finish().unwrap();

    assert_eq!(writer.data_size(), 0);
    assert!(matches!(writer.put(b"b", b"2"), Err(BulkError::Writer(_))));
    assert!(matches!(writer.finish(), Err(BulkError::Writer(_))));
}

#[test]
fn test_writer_close_is_idempotent() {
    let mut writer = SstWriter::new();
    writer.put(b"a", b"1").unwrap();
    writer.close();
    writer.close();

    assert!(matches!(writer.put(b"b", b"2"), Err(BulkError::Writer(_))));
}

// =============================================================================
// SstReader Tests - Lookups
// =============================================================================

#[test]
fn test_reader_opens_valid_sst() {
    let reader = SstReader::open(create_sst_with_entries(10)).unwrap();

    assert_eq!(reader.entry_count(), 10);
    assert_eq!(reader.min_key(), Some(b"key00000".as_slice()));
    assert_eq!(reader.max_key(), Some(b"key00009".as_slice()));
}

#[test]
fn test_reader_get() {
    let reader = SstReader::open(create_sst_with_entries(100)).unwrap();

    assert_eq!(
        reader.get(b"key00042").unwrap(),
        Some(Bytes::from_static(b"value42"))
    );
    assert_eq!(reader.get(b"nonexistent").unwrap(), None);
}

#[test]
fn test_reader_empty_sst() {
    let mut writer = SstWriter::new();
    let reader = SstReader::open(writer.finish().unwrap()).unwrap();

    assert_eq!(reader.entry_count(), 0);
    assert_eq!(reader.min_key(), None);
    assert!(collect(&reader, b"").is_empty());
}

// =============================================================================
// SstIter Tests
// =============================================================================

#[test]
fn test_iter_returns_all_entries_in_order() {
    let reader = SstReader::open(create_sst_with_entries(50)).unwrap();
    let entries = collect(&reader, b"");

    assert_eq!(entries.len(), 50);
    for window in entries.windows(2) {
        assert!(window[0].0 < window[1].0);
    }
    assert_eq!(entries[7].1, b"value7".to_vec());
}

#[test]
fn test_iter_seek_ge_between_keys() {
    let mut writer = SstWriter::new();
    for key in [b"b", b"d", b"f"] {
        writer.put(key, key).unwrap();
    }
    let reader = SstReader::open(writer.finish().unwrap()).unwrap();

    let mut iter = reader.iter();
    iter.seek_ge(b"c");
    assert!(iter.valid().unwrap());
    assert_eq!(iter.key(), b"d");

    iter.seek_ge(b"f");
    assert_eq!(iter.key(), b"f");
    iter.next();
    assert!(!iter.valid().unwrap());

    iter.seek_ge(b"g");
    assert!(!iter.valid().unwrap());
    assert_eq!(iter.key(), b"");
}

#[test]
fn test_iter_unpositioned_is_invalid() {
    let reader = SstReader::open(create_sst_with_entries(3)).unwrap();
    let iter = reader.iter();
    assert!(!iter.valid().unwrap());
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_reader_rejects_bad_magic() {
    let mut raw = create_sst_with_entries(3).to_vec();
    raw[0] = b'X';

    assert!(matches!(
        SstReader::open(Bytes::from(raw)),
        Err(BulkError::Corruption(_))
    ));
}

#[test]
fn test_reader_detects_flipped_data_byte() {
    let mut raw = create_sst_with_entries(3).to_vec();
    // First value byte of the first entry: header (14) + framing (8) + key (8)
    raw[14 + 8 + 8] ^= 0xff;

    let err = SstReader::open(Bytes::from(raw)).err().unwrap();
    assert!(err.to_string().contains("checksum"));
}

#[test]
fn test_reader_rejects_truncated_payload() {
    let raw = create_sst_with_entries(3);

    assert!(SstReader::open(raw.slice(..10)).is_err());
    assert!(SstReader::open(raw.slice(..raw.len() - 1)).is_err());
}
