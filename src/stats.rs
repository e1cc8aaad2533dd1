//! MVCC stats
//!
//! Aggregate counters describing a span of keys, shipped alongside an SST so
//! the store does not have to rescan it.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;
use crate::sst::SstIter;

/// Key/value counts and byte sizes for a span of keys
///
/// An empty value counts as a deletion: it is a key and a value, but not
/// live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MvccStats {
    pub key_count: i64,
    pub key_bytes: i64,
    pub val_count: i64,
    pub val_bytes: i64,
    pub live_count: i64,
    pub live_bytes: i64,
    /// Wall time of the last update (unix nanos), 0 when computed offline
    pub last_update_nanos: i64,
}

impl MvccStats {
    /// Account for one key-value pair
    pub fn add_entry(&mut self, key: &[u8], value: &[u8]) {
        let key_len = key.len() as i64;
        let val_len = value.len() as i64;

        self.key_count += 1;
        self.key_bytes += key_len;
        self.val_count += 1;
        self.val_bytes += val_len;
        if !value.is_empty() {
            self.live_count += 1;
            self.live_bytes += key_len + val_len;
        }
    }

    /// Merge `other` into `self`
    pub fn add(&mut self, other: &MvccStats) {
        self.key_count += other.key_count;
        self.key_bytes += other.key_bytes;
        self.val_count += other.val_count;
        self.val_bytes += other.val_bytes;
        self.live_count += other.live_count;
        self.live_bytes += other.live_bytes;
        self.last_update_nanos = self.last_update_nanos.max(other.last_update_nanos);
    }

    /// Remove `other` from `self`; keeps `self`'s update time
    pub fn subtract(&mut self, other: &MvccStats) {
        self.key_count -= other.key_count;
        self.key_bytes -= other.key_bytes;
        self.val_count -= other.val_count;
        self.val_bytes -= other.val_bytes;
        self.live_count -= other.live_count;
        self.live_bytes -= other.live_bytes;
    }

    /// Stamp the current wall time
    pub fn touch(&mut self) {
        self.last_update_nanos = now_nanos();
    }

    /// Compute stats for every entry of `iter` in `[start, end)`
    ///
    /// Repositions the cursor; does not otherwise mutate anything.
    pub fn compute(iter: &mut SstIter, start: &[u8], end: &[u8]) -> Result<MvccStats> {
        let mut stats = MvccStats::default();
        iter.seek_ge(start);
        while iter.valid()? {
            if iter.key() >= end {
                break;
            }
            stats.add_entry(iter.key(), iter.value());
            iter.next();
        }
        Ok(stats)
    }

    /// Total bytes accounted (keys + values)
    pub fn total_bytes(&self) -> i64 {
        self.key_bytes + self.val_bytes
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}
