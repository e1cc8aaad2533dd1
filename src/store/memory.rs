//! In-memory Store
//!
//! A range-partitioned store held entirely in memory. Ranges are tracked as
//! descriptors keyed by start key; data lives in one ordered map.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};

use crate::error::{BulkError, Result};
use crate::range_cache::{lookup, RangeDescriptor, RangeDescriptorCache};
use crate::sst::SstReader;
use crate::stats::MvccStats;

use super::{AddSstableRequest, IngestStore};

/// An accepted ingestion, as seen by the store
#[derive(Debug, Clone)]
pub struct IngestRecord {
    pub range_id: u64,
    pub start: Vec<u8>,
    pub end: Vec<u8>,
    pub entries: usize,
    /// Size of the SST payload
    pub sst_size: usize,
    /// Stats sent with the request
    pub stats: Option<MvccStats>,
    pub ingest_as_writes: bool,
    pub log_logical_op: bool,
}

/// In-memory range-partitioned store
///
/// ## Concurrency:
/// - `ranges`, `data`: RwLock (ingestions serialize on `data`)
/// - fault injection knobs: atomics
/// - All methods use `&self`
pub struct MemStore {
    /// Range descriptors keyed by start key
    ranges: RwLock<BTreeMap<Vec<u8>, RangeDescriptor>>,

    /// All ingested data
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,

    /// Accepted ingestions, in order
    ingested: Mutex<Vec<IngestRecord>>,

    /// Keys passed to successful split_and_scatter calls
    split_requests: Mutex<Vec<Vec<u8>>>,

    next_range_id: AtomicU64,

    /// Remaining add_sstable calls to fail with an ambiguous result
    ambiguous_failures: AtomicUsize,

    fail_split_scatter: AtomicBool,
}

impl MemStore {
    /// Create a store with a single range covering the keyspace
    pub fn new() -> Self {
        let mut ranges = BTreeMap::new();
        ranges.insert(
            Vec::new(),
            RangeDescriptor {
                range_id: 1,
                start_key: Vec::new(),
                end_key: None,
            },
        );

        Self {
            ranges: RwLock::new(ranges),
            data: RwLock::new(BTreeMap::new()),
            ingested: Mutex::new(Vec::new()),
            split_requests: Mutex::new(Vec::new()),
            next_range_id: AtomicU64::new(2),
            ambiguous_failures: AtomicUsize::new(0),
            fail_split_scatter: AtomicBool::new(false),
        }
    }

    /// Create a store pre-split at `split_keys`
    pub fn with_splits<I, K>(split_keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let store = Self::new();
        for key in split_keys {
            store.split_at(key.as_ref());
        }
        store
    }

    /// Split the range containing `key` so that a new range starts at `key`
    ///
    /// Returns false when `key` already starts a range.
    pub fn split_at(&self, key: &[u8]) -> bool {
        let mut ranges = self.ranges.write();
        let Some(mut left) = lookup(&ranges, key, false) else {
            return false;
        };
        if left.start_key.as_slice() == key {
            return false;
        }

        let right = RangeDescriptor {
            range_id: self.next_range_id.fetch_add(1, Ordering::SeqCst),
            start_key: key.to_vec(),
            end_key: left.end_key.take(),
        };
        left.end_key = Some(key.to_vec());

        tracing::debug!(
            "split range {} at {}, new range {}",
            left.range_id,
            key.escape_ascii(),
            right.range_id
        );

        ranges.insert(left.start_key.clone(), left);
        ranges.insert(right.start_key.clone(), right);
        true
    }

    /// Fail the next `count` ingestions with an ambiguous result
    pub fn inject_ambiguous(&self, count: usize) {
        self.ambiguous_failures.store(count, Ordering::SeqCst);
    }

    /// Make every split_and_scatter call fail
    pub fn fail_split_scatter(&self, fail: bool) {
        self.fail_split_scatter.store(fail, Ordering::SeqCst);
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.read().get(key).cloned()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// All stored entries in key order
    pub fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Accepted ingestions, in order
    pub fn ingested(&self) -> Vec<IngestRecord> {
        self.ingested.lock().clone()
    }

    /// Keys of successful split_and_scatter calls, in order
    pub fn split_requests(&self) -> Vec<Vec<u8>> {
        self.split_requests.lock().clone()
    }

    /// Current range boundaries (start keys of all ranges but the first)
    pub fn split_keys(&self) -> Vec<Vec<u8>> {
        self.ranges
            .read()
            .keys()
            .filter(|k| !k.is_empty())
            .cloned()
            .collect()
    }

    pub fn range_count(&self) -> usize {
        self.ranges.read().len()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Consume one injected ambiguous failure, if any
    fn take_ambiguous_failure(&self) -> bool {
        self.ambiguous_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Decode the payload, checking every key lies in `[start, end)`
    fn decode(request: &AddSstableRequest) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let reader = SstReader::open(request.data.clone())?;
        let mut entries = Vec::with_capacity(reader.entry_count());

        let mut iter = reader.iter();
        iter.seek_ge(&[]);
        while iter.valid()? {
            let key = iter.key();
            if key < request.start.as_slice() || key >= request.end.as_slice() {
                return Err(BulkError::Ingestion(format!(
                    "key {} outside of span [{}, {})",
                    key.escape_ascii(),
                    request.start.escape_ascii(),
                    request.end.escape_ascii()
                )));
            }
            entries.push((key.to_vec(), iter.value().to_vec()));
            iter.next();
        }
        Ok(entries)
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestStore for MemStore {
    fn add_sstable(&self, request: AddSstableRequest) -> Result<()> {
        if self.take_ambiguous_failure() {
            return Err(BulkError::AmbiguousResult(
                "injected: result of AddSSTable unknown".to_string(),
            ));
        }

        if request.start >= request.end {
            return Err(BulkError::Ingestion(format!(
                "empty span [{}, {})",
                request.start.escape_ascii(),
                request.end.escape_ascii()
            )));
        }

        // Route to the range holding the start key; the span must fit in it
        let desc = {
            let ranges = self.ranges.read();
            lookup(&ranges, &request.start, false)
                .ok_or_else(|| BulkError::Ingestion("no range for span".to_string()))?
        };
        if !desc.contains_span(&request.start, &request.end) {
            return match desc.end_key {
                Some(split_key) => Err(BulkError::RangeKeyMismatch {
                    split_key,
                    range_start: desc.start_key,
                }),
                None => Err(BulkError::Ingestion("span outside of keyspace".to_string())),
            };
        }

        let entries = Self::decode(&request)?;

        if let Some(sent) = &request.stats {
            let mut actual = MvccStats::default();
            for (k, v) in &entries {
                actual.add_entry(k, v);
            }
            actual.last_update_nanos = sent.last_update_nanos;
            if actual != *sent {
                return Err(BulkError::Ingestion(format!(
                    "stats mismatch: sent {:?}, computed {:?}",
                    sent, actual
                )));
            }
        }

        // Check collisions before applying anything: ingestion is atomic
        let mut data = self.data.write();
        if request.disallow_shadowing {
            for (key, value) in &entries {
                if let Some(existing) = data.get(key) {
                    if existing != value {
                        return Err(BulkError::Ingestion(format!(
                            "ingested key collides with an existing one: {}",
                            key.escape_ascii()
                        )));
                    }
                }
            }
        }

        let entry_count = entries.len();
        for (key, value) in entries {
            data.insert(key, value);
        }
        drop(data);

        tracing::trace!(
            "range {} ingested {} entries in [{}, {})",
            desc.range_id,
            entry_count,
            request.start.escape_ascii(),
            request.end.escape_ascii()
        );

        self.ingested.lock().push(IngestRecord {
            range_id: desc.range_id,
            start: request.start,
            end: request.end,
            entries: entry_count,
            sst_size: request.data.len(),
            stats: request.stats,
            ingest_as_writes: request.ingest_as_writes,
            log_logical_op: request.log_logical_op,
        });

        Ok(())
    }

    fn split_and_scatter(&self, key: &[u8], expiration: SystemTime) -> Result<()> {
        if self.fail_split_scatter.load(Ordering::SeqCst) {
            return Err(BulkError::SplitScatter(format!(
                "injected: cannot split at {}",
                key.escape_ascii()
            )));
        }
        if expiration <= SystemTime::now() {
            return Err(BulkError::SplitScatter("split expiration in the past".to_string()));
        }

        self.split_at(key);
        self.split_requests.lock().push(key.to_vec());
        Ok(())
    }
}

impl RangeDescriptorCache for MemStore {
    fn get_cached_range_descriptor(
        &self,
        key: &[u8],
        inverted: bool,
    ) -> Result<Option<RangeDescriptor>> {
        Ok(lookup(&self.ranges.read(), key, inverted))
    }
}
