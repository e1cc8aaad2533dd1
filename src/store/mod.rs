//! Store Module
//!
//! The ingestion surface of a range-partitioned key-value store.
//!
//! ## Responsibilities
//! - Atomically ingest an SST covering `[start, end)`
//! - Reject requests that cross a range boundary (`RangeKeyMismatch`)
//! - Split and scatter ranges on request
//!
//! `MemStore` is the in-process implementation used by the load tool and
//! the tests.

mod memory;

use std::time::SystemTime;

use bytes::Bytes;

use crate::error::Result;
use crate::stats::MvccStats;

pub use memory::{IngestRecord, MemStore};

/// One atomic SST ingestion request
#[derive(Debug, Clone)]
pub struct AddSstableRequest {
    /// Inclusive start of the covered span
    pub start: Vec<u8>,
    /// Exclusive end of the covered span
    pub end: Vec<u8>,
    /// Encoded SST payload
    pub data: Bytes,
    /// Reject keys that would shadow existing data with a different value
    pub disallow_shadowing: bool,
    /// Stats of the payload over `[start, end)`
    pub stats: Option<MvccStats>,
    /// Apply as a plain write batch instead of linking a file
    pub ingest_as_writes: bool,
    /// Emit the ingestion as a logical op for change feeds
    pub log_logical_op: bool,
}

/// Ingestion RPC surface of a store
///
/// Implementations must be safe to call from several batchers at once.
pub trait IngestStore: Send + Sync {
    /// Ingest an SST atomically
    ///
    /// Fails with `BulkError::RangeKeyMismatch` when the span does not fit in
    /// one range, and `BulkError::AmbiguousResult` when the outcome is
    /// unknown.
    fn add_sstable(&self, request: AddSstableRequest) -> Result<()>;

    /// Split at `key` and rebalance the new range
    ///
    /// The split is sticky until `expiration`.
    fn split_and_scatter(&self, key: &[u8], expiration: SystemTime) -> Result<()>;
}
