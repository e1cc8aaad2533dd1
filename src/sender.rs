//! SST Sender
//!
//! Ships finished SSTs to a store, splitting them wherever the store reports
//! a range boundary and retrying ambiguous results.
//!
//! ## Split-retry
//! ```text
//!   work queue: [ [a, z) ]
//!        │ store: RangeKeyMismatch at m
//!        ▼
//!   work queue: [ [a, m), [m, z) ]      (pushed to the front)
//!        │ store: ok
//!        ▼
//!   work queue: [ [m, z) ] ...
//! ```
//! Halves are rebuilt from one cursor over the original payload, never from
//! the partial span they replace.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::config::BatcherConfig;
use crate::context::Context;
use crate::error::{BulkError, Result};
use crate::sst::{SstIter, SstReader, SstWriter};
use crate::stats::MvccStats;
use crate::store::{AddSstableRequest, IngestStore};

/// An independently ingestable piece of an SST: `[start, end)`
#[derive(Debug, Clone)]
pub struct SstSpan {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
    pub data: Bytes,
    pub stats: Option<MvccStats>,
}

/// Outcome of offering one span to the store
enum Attempt {
    Ingested,
    /// The store's range ends inside the span at this key
    Split(Vec<u8>),
}

/// Sends SSTs to an `IngestStore`
///
/// Thread-safe: any number of batchers may share one sender.
pub struct SstSender {
    store: Arc<dyn IngestStore>,
    too_small_sst_size: u64,
    max_retries: usize,
    log_logical_ops: bool,

    /// Spans split on a range boundary
    range_splits: AtomicU64,
    /// Attempts repeated after an ambiguous result
    retries: AtomicU64,
}

impl SstSender {
    pub fn new(store: Arc<dyn IngestStore>, config: &BatcherConfig) -> Self {
        Self {
            store,
            too_small_sst_size: config.too_small_sst_size,
            max_retries: config.max_retries.max(1),
            log_logical_ops: config.log_logical_ops,
            range_splits: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    /// The store this sender writes to
    pub fn store(&self) -> &Arc<dyn IngestStore> {
        &self.store
    }

    /// Ingest `data`, covering `[start, end)`, returning the number of files
    /// the store accepted
    ///
    /// Stats are computed from the payload when not supplied. On failure the
    /// error is `SstIngest`, carrying the files written before the abort.
    pub fn add_sstable(
        &self,
        ctx: &Context,
        start: &[u8],
        end: &[u8],
        data: Bytes,
        disallow_shadowing: bool,
        stats: Option<MvccStats>,
    ) -> Result<usize> {
        let mut files_written = 0;
        match self.send(ctx, start, end, data, disallow_shadowing, stats, &mut files_written) {
            Ok(()) => Ok(files_written),
            Err(e) => Err(BulkError::SstIngest {
                files_written,
                source: Box::new(e),
            }),
        }
    }

    /// Spans split on a range boundary so far
    pub fn range_splits(&self) -> u64 {
        self.range_splits.load(Ordering::Relaxed)
    }

    /// Ambiguous-result retries so far
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    fn send(
        &self,
        ctx: &Context,
        start: &[u8],
        end: &[u8],
        data: Bytes,
        disallow_shadowing: bool,
        stats: Option<MvccStats>,
        files_written: &mut usize,
    ) -> Result<()> {
        // Cursor over the original payload, shared by every split
        let mut cursor: Option<SstIter> = None;

        let stats = match stats {
            Some(stats) => stats,
            None => {
                let mut iter = SstReader::open(data.clone())?.iter();
                let stats = MvccStats::compute(&mut iter, start, end)?;
                cursor = Some(iter);
                stats
            }
        };

        let original = data.clone();
        let mut work = VecDeque::new();
        work.push_back(SstSpan {
            start: start.to_vec(),
            end: end.to_vec(),
            data,
            stats: Some(stats),
        });

        while let Some(span) = work.pop_front() {
            match self.ingest_span(ctx, &span, disallow_shadowing)? {
                Attempt::Ingested => {
                    *files_written += 1;
                    tracing::trace!(
                        "ingested [{}, {}) ({} bytes)",
                        span.start.escape_ascii(),
                        span.end.escape_ascii(),
                        span.data.len()
                    );
                }
                Attempt::Split(split_key) => {
                    tracing::debug!(
                        "SST [{}, {}) crosses range boundary at {}, splitting",
                        span.start.escape_ascii(),
                        span.end.escape_ascii(),
                        split_key.escape_ascii()
                    );
                    self.range_splits.fetch_add(1, Ordering::Relaxed);

                    let mut iter = match cursor.take() {
                        Some(iter) => iter,
                        None => SstReader::open(original.clone())?.iter(),
                    };
                    let halves = split_span(&mut iter, &span, &split_key);
                    cursor = Some(iter);

                    // Left first: retried before anything queued earlier
                    let (left, right) = halves?;
                    if let Some(right) = right {
                        work.push_front(right);
                    }
                    if let Some(left) = left {
                        work.push_front(left);
                    }
                }
            }
        }

        Ok(())
    }

    /// Offer one span to the store until it lands, needs splitting, or the
    /// retry budget runs out
    fn ingest_span(&self, ctx: &Context, span: &SstSpan, disallow_shadowing: bool) -> Result<Attempt> {
        let ingest_as_writes = (span.data.len() as u64) < self.too_small_sst_size;
        let mut attempt = 0;

        loop {
            ctx.check()?;
            attempt += 1;

            let request = AddSstableRequest {
                start: span.start.clone(),
                end: span.end.clone(),
                data: span.data.clone(),
                disallow_shadowing,
                stats: span.stats,
                ingest_as_writes,
                log_logical_op: self.log_logical_ops,
            };

            match self.store.add_sstable(request) {
                Ok(()) => return Ok(Attempt::Ingested),
                Err(BulkError::RangeKeyMismatch { split_key, .. }) => {
                    return Ok(Attempt::Split(split_key));
                }
                Err(BulkError::AmbiguousResult(msg)) if attempt < self.max_retries => {
                    tracing::warn!(
                        "ambiguous result ingesting [{}, {}), attempt {}/{}: {}",
                        span.start.escape_ascii(),
                        span.end.escape_ascii(),
                        attempt,
                        self.max_retries,
                        msg
                    );
                    self.retries.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Split `span` at `split_key` into `[start, split_key)` and
/// `[split_key, end)`, reading entries from `iter` over the original payload
///
/// The right half's stats are computed while copying it; the left half's are
/// derived by subtracting them from the span's. A half without entries is
/// `None`.
pub fn split_span(
    iter: &mut SstIter,
    span: &SstSpan,
    split_key: &[u8],
) -> Result<(Option<SstSpan>, Option<SstSpan>)> {
    if split_key <= span.start.as_slice() || split_key >= span.end.as_slice() {
        return Err(BulkError::Ingestion(format!(
            "range boundary {} does not fall inside span [{}, {})",
            split_key.escape_ascii(),
            span.start.escape_ascii(),
            span.end.escape_ascii()
        )));
    }

    let mut left = SstWriter::new();
    let mut right = SstWriter::new();
    let mut left_stats = MvccStats::default();
    let mut right_stats = MvccStats::default();

    iter.seek_ge(&span.start);
    while iter.valid()? {
        let (key, value) = (iter.key(), iter.value());
        if key >= span.end.as_slice() {
            break;
        }
        if key < split_key {
            left.put(key, value)?;
            if span.stats.is_none() {
                left_stats.add_entry(key, value);
            }
        } else {
            right.put(key, value)?;
            right_stats.add_entry(key, value);
        }
        iter.next();
    }

    if let Some(stats) = &span.stats {
        left_stats = *stats;
        left_stats.subtract(&right_stats);
        right_stats.last_update_nanos = stats.last_update_nanos;
    }

    let left = if left.is_empty() {
        None
    } else {
        Some(SstSpan {
            start: span.start.clone(),
            end: split_key.to_vec(),
            data: left.finish()?,
            stats: Some(left_stats),
        })
    };
    let right = if right.is_empty() {
        None
    } else {
        Some(SstSpan {
            start: split_key.to_vec(),
            end: span.end.clone(),
            data: right.finish()?,
            stats: Some(right_stats),
        })
    };

    Ok((left, right))
}
