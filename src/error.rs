//! Error types for sstbatch
//!
//! Provides a unified error type for batching, ingestion and splitting.

use thiserror::Error;

/// Result type alias using BulkError
pub type Result<T> = std::result::Result<T, BulkError>;

/// Unified error type for bulk ingestion operations
#[derive(Debug, Error)]
pub enum BulkError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Key Ordering Errors (caller-recoverable)
    // -------------------------------------------------------------------------
    #[error("duplicate key {} with value {}", .key.escape_ascii(), .value.escape_ascii())]
    DuplicateKey { key: Vec<u8>, value: Vec<u8> },

    #[error("key {} added after {}: keys must be added in order", .key.escape_ascii(), .last.escape_ascii())]
    KeyOutOfOrder { key: Vec<u8>, last: Vec<u8> },

    #[error("malformed key: {0}")]
    MalformedKey(String),

    // -------------------------------------------------------------------------
    // SST Errors
    // -------------------------------------------------------------------------
    #[error("SST corruption detected: {0}")]
    Corruption(String),

    #[error("SST writer error: {0}")]
    Writer(String),

    // -------------------------------------------------------------------------
    // Store Errors (returned by an IngestStore)
    // -------------------------------------------------------------------------
    #[error(
        "range key mismatch: request crosses range [{}, {}) at {}",
        .range_start.escape_ascii(),
        .split_key.escape_ascii(),
        .split_key.escape_ascii()
    )]
    RangeKeyMismatch {
        /// End key of the range that contains the request start
        split_key: Vec<u8>,
        /// Start key of that range
        range_start: Vec<u8>,
    },

    #[error("ambiguous result: {0}")]
    AmbiguousResult(String),

    #[error("ingestion error: {0}")]
    Ingestion(String),

    // -------------------------------------------------------------------------
    // Sender Errors
    // -------------------------------------------------------------------------
    #[error("SST ingestion failed after writing {files_written} files: {source}")]
    SstIngest {
        files_written: usize,
        #[source]
        source: Box<BulkError>,
    },

    #[error("split and scatter failed: {0}")]
    SplitScatter(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("operation cancelled")]
    Cancelled,

    #[error("batcher is closed")]
    Closed,

    #[error("configuration error: {0}")]
    Config(String),
}

impl BulkError {
    /// The innermost cause, looking through `SstIngest` wrappers
    pub fn root_cause(&self) -> &BulkError {
        match self {
            BulkError::SstIngest { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
