//! SST Batcher
//!
//! Accumulates sorted key-value pairs into an SST and decides when to hand
//! it to the sender.
//!
//! ## Flush decision (on every `add_key`, before the key is buffered)
//! 1. First key of a cycle: look up the end of the range holding it, once
//! 2. Next key at or past that range end → flush (`RangeBoundary`)
//! 3. Buffered size over `max_sst_size` and the next key starts a new row
//!    → flush (`SizeThreshold`)
//! 4. Otherwise keep buffering
//!
//! A flush always covers only keys already buffered, so no SST reaches past
//! the point where the boundary check said to stop.

use std::sync::Arc;
use std::time::SystemTime;

use crate::config::{BatcherConfig, DedupMode};
use crate::context::Context;
use crate::error::{BulkError, Result};
use crate::keys::next_key;
use crate::range_cache::RangeDescriptorCache;
use crate::sender::SstSender;
use crate::split::SplitScatterCoordinator;
use crate::sst::SstWriter;
use crate::stats::MvccStats;
use crate::store::IngestStore;
use crate::summary::{BulkOpSummary, RowCounter};

/// Why a flush happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Requested by the caller
    Manual,
    /// Buffered data reached `max_sst_size`
    SizeThreshold,
    /// The next key belongs to the next range
    RangeBoundary,
}

/// Flush accounting over a batcher's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushCounts {
    pub total: u64,
    pub manual: u64,
    pub size: u64,
    pub range_boundary: u64,
    /// Files the store accepted (more than flushes when SSTs were split)
    pub files: u64,
    /// Split/scatter requests issued
    pub split_requests: u64,
}

impl FlushCounts {
    fn record(&mut self, reason: FlushReason) {
        self.total += 1;
        match reason {
            FlushReason::Manual => self.manual += 1,
            FlushReason::SizeThreshold => self.size += 1,
            FlushReason::RangeBoundary => self.range_boundary += 1,
        }
    }
}

/// Cached end of the range holding the current cycle's keys
#[derive(Debug, Clone, PartialEq, Eq)]
enum FlushKey {
    /// Not looked up yet this cycle
    Unchecked,
    /// Looked up, nothing usable
    Unknown,
    Known(Vec<u8>),
}

/// Batches sorted keys into range-bounded SSTs
///
/// Not safe for concurrent use: one batcher per producer, all sharing one
/// `SstSender`.
pub struct SstBatcher {
    config: BatcherConfig,
    ctx: Context,
    sender: Arc<SstSender>,
    range_cache: Option<Arc<dyn RangeDescriptorCache>>,
    /// `None` when proactive splitting is disabled
    splitter: Option<SplitScatterCoordinator>,

    // -------------------------------------------------------------------------
    // Per-cycle state (cleared by reset)
    // -------------------------------------------------------------------------
    writer: SstWriter,
    start_key: Vec<u8>,
    end_key: Vec<u8>,
    flush_key: FlushKey,
    row_counter: RowCounter,
    /// Accumulated on the fly when shadowing is disallowed
    stats: MvccStats,
    /// Last key added since the last reset, for ordering and duplicate checks
    last_key: Option<Vec<u8>>,
    /// Last value added; only kept when identical duplicates are skipped
    last_value: Vec<u8>,

    // -------------------------------------------------------------------------
    // Lifetime state
    // -------------------------------------------------------------------------
    total: BulkOpSummary,
    total_bytes: u64,
    /// Bytes flushed since the believed range boundary last changed
    flushed_in_range: u64,
    /// Range end in effect for the previous flush
    last_range_end: Option<Vec<u8>>,
    flush_counts: FlushCounts,
    /// Split requests that could not even be queued
    split_enqueue_failures: u64,
    closed: bool,
}

impl SstBatcher {
    /// Create a batcher feeding `sender`, consulting `range_cache` for range
    /// boundaries when given
    pub fn new(
        config: BatcherConfig,
        sender: Arc<SstSender>,
        range_cache: Option<Arc<dyn RangeDescriptorCache>>,
        ctx: Context,
    ) -> Result<Self> {
        let splitter = if config.scatter_splits {
            Some(SplitScatterCoordinator::start(Arc::clone(sender.store()))?)
        } else {
            None
        };
        let row_counter = RowCounter::new(config.split_key_format);

        Ok(Self {
            config,
            ctx,
            sender,
            range_cache,
            splitter,
            writer: SstWriter::new(),
            start_key: Vec::new(),
            end_key: Vec::new(),
            flush_key: FlushKey::Unchecked,
            row_counter,
            stats: MvccStats::default(),
            last_key: None,
            last_value: Vec::new(),
            total: BulkOpSummary::default(),
            total_bytes: 0,
            flushed_in_range: 0,
            last_range_end: None,
            flush_counts: FlushCounts::default(),
            split_enqueue_failures: 0,
            closed: false,
        })
    }

    /// Create a batcher with its own sender over `store`
    pub fn with_store(
        config: BatcherConfig,
        store: Arc<dyn IngestStore>,
        range_cache: Option<Arc<dyn RangeDescriptorCache>>,
    ) -> Result<Self> {
        let sender = Arc::new(SstSender::new(store, &config));
        Self::new(config, sender, range_cache, Context::new())
    }

    /// Add a key-value pair
    ///
    /// Keys must arrive in non-decreasing order between resets. An exact
    /// repeat of the previous key is skipped or rejected with `DuplicateKey`
    /// depending on the dedup mode; a lower key is `KeyOutOfOrder`. May flush
    /// the previously buffered keys first; if that flush fails its keys are
    /// dropped and the error returned.
    pub fn add_key(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_open()?;

        if let Some(last) = &self.last_key {
            match key.cmp(last.as_slice()) {
                std::cmp::Ordering::Less => {
                    return Err(BulkError::KeyOutOfOrder {
                        key: key.to_vec(),
                        last: last.clone(),
                    });
                }
                std::cmp::Ordering::Equal => {
                    return match self.config.dedup_mode {
                        DedupMode::Lenient => Ok(()),
                        DedupMode::Strict
                            if self.config.skip_duplicates && value == self.last_value.as_slice() =>
                        {
                            Ok(())
                        }
                        DedupMode::Strict => Err(BulkError::DuplicateKey {
                            key: key.to_vec(),
                            value: value.to_vec(),
                        }),
                    };
                }
                std::cmp::Ordering::Greater => {}
            }
        }

        self.maybe_flush(key)?;

        if self.writer.is_empty() {
            self.start_key.clear();
            self.start_key.extend_from_slice(key);
        }
        self.writer.put(key, value)?;

        self.end_key.clear();
        self.end_key.extend_from_slice(key);
        self.last_key = Some(key.to_vec());
        if self.config.dedup_mode == DedupMode::Strict && self.config.skip_duplicates {
            self.last_value.clear();
            self.last_value.extend_from_slice(value);
        }

        self.row_counter.count(key, value);
        if self.config.disallow_shadowing {
            self.stats.add_entry(key, value);
        }

        Ok(())
    }

    /// Flush whatever is buffered, then start a new cycle
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.do_flush(FlushReason::Manual, None)?;
        self.reset();
        Ok(())
    }

    /// Drop the current cycle's buffered data and state
    ///
    /// Lifetime totals survive. The ordering guard starts over, so keys of a
    /// failed flush can be added again. Idempotent.
    pub fn reset(&mut self) {
        self.writer.close();
        if !self.closed {
            self.writer = SstWriter::new();
        }
        self.start_key.clear();
        self.end_key.clear();
        self.flush_key = FlushKey::Unchecked;
        self.row_counter.reset();
        self.stats = MvccStats::default();
        self.last_key = None;
        self.last_value.clear();
    }

    /// Release resources without flushing. Idempotent.
    ///
    /// Waits for queued split/scatter requests to finish.
    pub fn close(&mut self) {
        self.writer.close();
        if let Some(splitter) = self.splitter.as_mut() {
            splitter.shutdown();
        }
        self.closed = true;
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Totals over every successful flush
    pub fn summary(&self) -> BulkOpSummary {
        self.total
    }

    /// Totals for the keys buffered in the current cycle
    pub fn batch_summary(&self) -> BulkOpSummary {
        self.row_counter.summary()
    }

    /// SST data bytes flushed over the batcher's lifetime
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Data bytes buffered in the current cycle
    pub fn buffered_size(&self) -> u64 {
        self.writer.data_size()
    }

    pub fn flush_counts(&self) -> FlushCounts {
        self.flush_counts
    }

    /// Split/scatter requests that failed, whether queuing or in the store
    pub fn split_scatter_failures(&self) -> u64 {
        self.split_enqueue_failures + self.splitter.as_ref().map_or(0, |s| s.failed())
    }

    pub fn sender(&self) -> &Arc<SstSender> {
        &self.sender
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(BulkError::Closed);
        }
        Ok(())
    }

    /// Flush the buffered keys if `next` must not join them
    fn maybe_flush(&mut self, next: &[u8]) -> Result<()> {
        if !self.writer.is_empty() {
            let reason = match &self.flush_key {
                FlushKey::Known(range_end) if next >= range_end.as_slice() => {
                    Some(FlushReason::RangeBoundary)
                }
                _ if self.writer.data_size() >= self.config.max_sst_size => {
                    if self.config.split_key_format.same_row(&self.end_key, next) {
                        // Keep a row's keys together even past the size limit
                        None
                    } else {
                        Some(FlushReason::SizeThreshold)
                    }
                }
                _ => None,
            };

            if let Some(reason) = reason {
                self.do_flush(reason, Some(next))?;
                self.reset();
            }
        }

        if self.writer.is_empty() && self.flush_key == FlushKey::Unchecked {
            self.flush_key = self.lookup_range_end(next);
        }
        Ok(())
    }

    /// Best-effort lookup of where the range holding `key` ends
    fn lookup_range_end(&self, key: &[u8]) -> FlushKey {
        let Some(cache) = &self.range_cache else {
            return FlushKey::Unknown;
        };
        match cache.get_cached_range_descriptor(key, false) {
            Ok(Some(desc)) if desc.contains_key(key) => match desc.end_key {
                Some(end) => FlushKey::Known(end),
                None => FlushKey::Unknown,
            },
            Ok(_) => FlushKey::Unknown,
            Err(e) => {
                tracing::debug!("range lookup for {} failed: {}", key.escape_ascii(), e);
                FlushKey::Unknown
            }
        }
    }

    /// Send the buffered SST. Does not reset on success.
    ///
    /// On failure the cycle is dropped and nothing is added to the lifetime
    /// totals.
    fn do_flush(&mut self, reason: FlushReason, next: Option<&[u8]>) -> Result<()> {
        if self.writer.is_empty() {
            return Ok(());
        }

        let start = self.start_key.clone();
        let end = match (reason, &self.flush_key) {
            (FlushReason::RangeBoundary, FlushKey::Known(range_end)) => range_end.clone(),
            _ => next_key(&self.end_key),
        };
        let size = self.writer.data_size();

        let files = match self.send_buffered(&start, &end) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(
                    "{:?} flush of [{}, {}) failed: {}",
                    reason,
                    start.escape_ascii(),
                    end.escape_ascii(),
                    e
                );
                // The writer is spent either way
                self.reset();
                return Err(e);
            }
        };

        let first_flush = self.flush_counts.total == 0;
        self.flush_counts.record(reason);
        self.flush_counts.files += files as u64;

        // No range information yet: carve this span off so later SSTs can
        // land in their own range
        if first_flush
            && reason == FlushReason::SizeThreshold
            && !matches!(self.flush_key, FlushKey::Known(_))
        {
            self.request_split(&start);
        }

        tracing::debug!(
            "flushed {:?} SST [{}, {}): {} bytes, {} files",
            reason,
            start.escape_ascii(),
            end.escape_ascii(),
            size,
            files
        );

        // Track bytes landing in the current believed range
        let range_end = match &self.flush_key {
            FlushKey::Known(range_end) => Some(range_end.clone()),
            _ => None,
        };
        if files > 1 || range_end != self.last_range_end {
            self.flushed_in_range = size;
            self.last_range_end = range_end;
        } else {
            self.flushed_in_range += size;
        }

        if let (Some(split_after), Some(next)) = (self.config.split_after, next) {
            if self.flushed_in_range > split_after {
                tracing::debug!(
                    "{} bytes flushed into current range, splitting at {}",
                    self.flushed_in_range,
                    next.escape_ascii()
                );
                self.request_split(next);
                self.flushed_in_range = 0;
            }
        }

        self.total.add(&self.row_counter.summary());
        self.total_bytes += size;

        Ok(())
    }

    /// Finish the writer and hand its SST to the sender
    fn send_buffered(&mut self, start: &[u8], end: &[u8]) -> Result<usize> {
        let data = self.writer.finish()?;

        let stats = if self.config.disallow_shadowing {
            let mut stats = self.stats;
            stats.touch();
            Some(stats)
        } else {
            None
        };

        self.sender.add_sstable(
            &self.ctx,
            start,
            end,
            data,
            self.config.disallow_shadowing,
            stats,
        )
    }

    /// Queue a split/scatter at the row start of `key`; never fails
    fn request_split(&mut self, key: &[u8]) {
        let Some(splitter) = &self.splitter else {
            return;
        };

        let split_at = match self.config.split_key_format.safe_split_key(key) {
            Ok(row) => row.to_vec(),
            Err(e) => {
                tracing::warn!("not splitting at {}: {}", key.escape_ascii(), e);
                return;
            }
        };
        let expiration = SystemTime::now() + self.config.split_scatter_expiration;

        self.flush_counts.split_requests += 1;
        if let Err(e) = splitter.request_split_and_scatter(&split_at, expiration) {
            tracing::warn!("failed to request split at {}: {}", split_at.escape_ascii(), e);
            self.split_enqueue_failures += 1;
        }
    }
}
