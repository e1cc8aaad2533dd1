//! Range descriptor lookups
//!
//! The batcher asks a best-effort cache where the range holding a key ends,
//! so it can cut SSTs at range boundaries before the store rejects them.
//! Answers may be stale or missing; neither is fatal.

use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;

use crate::error::Result;

/// A contiguous shard of the keyspace: `[start_key, end_key)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeDescriptor {
    pub range_id: u64,
    pub start_key: Vec<u8>,
    /// `None` for the last range of the keyspace
    pub end_key: Option<Vec<u8>>,
}

impl RangeDescriptor {
    pub fn contains_key(&self, key: &[u8]) -> bool {
        key >= self.start_key.as_slice()
            && self.end_key.as_deref().map_or(true, |end| key < end)
    }

    /// Whether `[start, end)` fits inside this range
    pub fn contains_span(&self, start: &[u8], end: &[u8]) -> bool {
        start >= self.start_key.as_slice()
            && self.end_key.as_deref().map_or(true, |range_end| end <= range_end)
    }
}

/// Best-effort range descriptor lookup
pub trait RangeDescriptorCache: Send + Sync {
    /// The cached descriptor of the range containing `key`
    ///
    /// With `inverted`, the range whose end key equals `key` (the range
    /// containing the key just before it).
    fn get_cached_range_descriptor(
        &self,
        key: &[u8],
        inverted: bool,
    ) -> Result<Option<RangeDescriptor>>;
}

/// Range cache over a fixed set of split keys
///
/// Splits are only learned through `insert_split`, so it goes stale exactly
/// the way a real descriptor cache does when the store splits behind it.
#[derive(Debug, Default)]
pub struct StaticRangeCache {
    /// Sorted split keys; range i ends at splits[i]
    splits: RwLock<Vec<Vec<u8>>>,
}

impl StaticRangeCache {
    /// Cache that believes the keyspace is split at `split_keys`
    pub fn new<I, K>(split_keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Vec<u8>>,
    {
        let mut splits: Vec<Vec<u8>> = split_keys.into_iter().map(Into::into).collect();
        splits.sort();
        splits.dedup();
        Self {
            splits: RwLock::new(splits),
        }
    }

    /// Learn about a new split
    pub fn insert_split(&self, key: impl Into<Vec<u8>>) {
        let key = key.into();
        let mut splits = self.splits.write();
        if let Err(pos) = splits.binary_search(&key) {
            splits.insert(pos, key);
        }
    }

    fn descriptors(&self) -> BTreeMap<Vec<u8>, RangeDescriptor> {
        let splits = self.splits.read();
        let mut ranges = BTreeMap::new();
        let mut start = Vec::new();
        for (i, split) in splits.iter().enumerate() {
            if split.is_empty() {
                continue;
            }
            ranges.insert(
                start.clone(),
                RangeDescriptor {
                    range_id: i as u64 + 1,
                    start_key: start,
                    end_key: Some(split.clone()),
                },
            );
            start = split.clone();
        }
        ranges.insert(
            start.clone(),
            RangeDescriptor {
                range_id: splits.len() as u64 + 1,
                start_key: start,
                end_key: None,
            },
        );
        ranges
    }
}

impl RangeDescriptorCache for StaticRangeCache {
    fn get_cached_range_descriptor(
        &self,
        key: &[u8],
        inverted: bool,
    ) -> Result<Option<RangeDescriptor>> {
        Ok(lookup(&self.descriptors(), key, inverted))
    }
}

/// Find the range containing `key` (or ending at it, when inverted)
pub(crate) fn lookup(
    ranges: &BTreeMap<Vec<u8>, RangeDescriptor>,
    key: &[u8],
    inverted: bool,
) -> Option<RangeDescriptor> {
    let bound = if inverted {
        Bound::Excluded(key)
    } else {
        Bound::Included(key)
    };
    ranges
        .range::<[u8], _>((Bound::Unbounded, bound))
        .next_back()
        .map(|(_, desc)| desc.clone())
}
