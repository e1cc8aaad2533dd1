//! Configuration for sstbatch
//!
//! Centralized batcher/sender configuration with sensible defaults.

use std::time::Duration;

use crate::error::{BulkError, Result};
use crate::keys::SplitKeyFormat;

/// Configuration for an SST batcher and the sender it feeds
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    // -------------------------------------------------------------------------
    // Flush Configuration
    // -------------------------------------------------------------------------
    /// Buffered SST data size that triggers a size flush (in bytes)
    pub max_sst_size: u64,

    /// Bytes flushed into one believed range before a proactive split is
    /// requested. `None` disables the trigger.
    pub split_after: Option<u64>,

    /// How keys map to rows; size flushes never separate two keys of one row
    pub split_key_format: SplitKeyFormat,

    // -------------------------------------------------------------------------
    // Ingestion Configuration
    // -------------------------------------------------------------------------
    /// SSTs smaller than this are ingested as a plain write batch
    pub too_small_sst_size: u64,

    /// Attempts per span before an ambiguous result becomes fatal
    pub max_retries: usize,

    /// Keys are unique and must not shadow existing data; enables
    /// on-the-fly stats accumulation
    pub disallow_shadowing: bool,

    /// Ask the store to log the ingestion as a logical op
    pub log_logical_ops: bool,

    // -------------------------------------------------------------------------
    // Duplicate Handling
    // -------------------------------------------------------------------------
    /// How an exact repeat of the previous key is treated
    pub dedup_mode: DedupMode,

    /// In strict mode, silently skip a repeated key whose value is identical
    pub skip_duplicates: bool,

    // -------------------------------------------------------------------------
    // Split/Scatter Configuration
    // -------------------------------------------------------------------------
    /// Issue proactive split/scatter requests
    pub scatter_splits: bool,

    /// Expiration attached to proactive split requests
    pub split_scatter_expiration: Duration,
}

/// Duplicate-key handling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupMode {
    /// A repeated key is an error unless `skip_duplicates` is set and the
    /// value is identical
    Strict,

    /// A repeated key is skipped silently whatever its value
    Lenient,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_sst_size: 16 * 1024 * 1024,             // 16 MB
            split_after: Some(48 * 1024 * 1024),        // 48 MB
            split_key_format: SplitKeyFormat::Raw,
            too_small_sst_size: 400 * 1024,             // 400 KB
            max_retries: 10,
            disallow_shadowing: false,
            log_logical_ops: false,
            dedup_mode: DedupMode::Strict,
            skip_duplicates: false,
            scatter_splits: true,
            split_scatter_expiration: Duration::from_secs(10 * 60),
        }
    }
}

impl BatcherConfig {
    /// Create a new config builder
    pub fn builder() -> BatcherConfigBuilder {
        BatcherConfigBuilder::default()
    }
}

/// Builder for BatcherConfig
#[derive(Default)]
pub struct BatcherConfigBuilder {
    config: BatcherConfig,
}

impl BatcherConfigBuilder {
    /// Set the size flush threshold (in bytes)
    pub fn max_sst_size(mut self, size: u64) -> Self {
        self.config.max_sst_size = size;
        self
    }

    /// Set the per-range byte budget that triggers a proactive split
    pub fn split_after(mut self, size: Option<u64>) -> Self {
        self.config.split_after = size;
        self
    }

    /// Set the row key format used to find safe split keys
    pub fn split_key_format(mut self, format: SplitKeyFormat) -> Self {
        self.config.split_key_format = format;
        self
    }

    /// Set the write-batch ingestion threshold (in bytes)
    pub fn too_small_sst_size(mut self, size: u64) -> Self {
        self.config.too_small_sst_size = size;
        self
    }

    /// Set the per-span retry budget
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Disallow shadowing of existing keys
    pub fn disallow_shadowing(mut self, disallow: bool) -> Self {
        self.config.disallow_shadowing = disallow;
        self
    }

    /// Log ingestions as logical ops
    pub fn log_logical_ops(mut self, log: bool) -> Self {
        self.config.log_logical_ops = log;
        self
    }

    /// Set the duplicate handling mode
    pub fn dedup_mode(mut self, mode: DedupMode) -> Self {
        self.config.dedup_mode = mode;
        self
    }

    /// Skip identical duplicates in strict mode
    pub fn skip_duplicates(mut self, skip: bool) -> Self {
        self.config.skip_duplicates = skip;
        self
    }

    /// Enable or disable proactive split/scatter requests
    pub fn scatter_splits(mut self, enabled: bool) -> Self {
        self.config.scatter_splits = enabled;
        self
    }

    /// Set the expiration attached to split requests
    pub fn split_scatter_expiration(mut self, expiration: Duration) -> Self {
        self.config.split_scatter_expiration = expiration;
        self
    }

    pub fn build(self) -> Result<BatcherConfig> {
        if self.config.max_sst_size == 0 {
            return Err(BulkError::Config("max_sst_size must be positive".to_string()));
        }
        if self.config.max_retries == 0 {
            return Err(BulkError::Config("max_retries must be positive".to_string()));
        }
        Ok(self.config)
    }
}
