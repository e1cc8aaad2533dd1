//! # sstbatch
//!
//! Bulk SST ingestion for a range-partitioned key-value store:
//! - Batches sorted writes into range-bounded SSTs
//! - Keeps multi-family rows inside one SST
//! - Splits and resubmits SSTs that cross a range boundary
//! - Retries ambiguous ingestion results with a bounded budget
//! - Proactively splits and scatters ranges that fill up
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Bulk load (IMPORT, RESTORE, backfill)           │
//! │                 add_key() in sorted order                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      SstBatcher                              │
//! │        (SstWriter + flush decisions + row counting)          │
//! └──────┬──────────────────────┬──────────────────────┬────────┘
//!        │ range end?           │ finished SST         │ split hint
//!        ▼                      ▼                      ▼
//!  ┌─────────────┐      ┌───────────────┐      ┌──────────────────┐
//!  │ RangeDesc.  │      │   SstSender   │      │  SplitScatter    │
//!  │   Cache     │      │ (split-retry) │      │  Coordinator     │
//!  └─────────────┘      └───────┬───────┘      └────────┬─────────┘
//!                               │                       │
//!                               ▼                       ▼
//!                       ┌───────────────────────────────────┐
//!                       │            IngestStore            │
//!                       └───────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod context;

pub mod keys;
pub mod stats;
pub mod summary;
pub mod sst;
pub mod range_cache;
pub mod store;
pub mod sender;
pub mod split;
pub mod batcher;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BulkError, Result};
pub use config::{BatcherConfig, DedupMode};
pub use context::Context;
pub use batcher::{FlushCounts, FlushReason, SstBatcher};
pub use sender::{SstSender, SstSpan};
pub use store::{AddSstableRequest, IngestStore, MemStore};
pub use range_cache::{RangeDescriptor, RangeDescriptorCache, StaticRangeCache};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of sstbatch
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
