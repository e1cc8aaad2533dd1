//! Bulk operation summaries
//!
//! Row and byte accounting for batches and for a batcher's whole lifetime.

use crate::keys::SplitKeyFormat;

/// Rows, entries and bytes written by a bulk operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOpSummary {
    /// Key + value bytes of every entry
    pub data_size: u64,
    /// Distinct logical rows (row prefixes)
    pub rows: u64,
    /// Key-value entries
    pub entries: u64,
}

impl BulkOpSummary {
    pub fn add(&mut self, other: &BulkOpSummary) {
        self.data_size += other.data_size;
        self.rows += other.rows;
        self.entries += other.entries;
    }
}

/// Counts rows in a stream of sorted keys
///
/// A new row starts whenever the safe split key changes, so the keys of a
/// multi-family row count once.
#[derive(Debug, Clone)]
pub struct RowCounter {
    format: SplitKeyFormat,
    summary: BulkOpSummary,
    last_row: Option<Vec<u8>>,
}

impl RowCounter {
    pub fn new(format: SplitKeyFormat) -> Self {
        Self {
            format,
            summary: BulkOpSummary::default(),
            last_row: None,
        }
    }

    /// Account for one entry
    pub fn count(&mut self, key: &[u8], value: &[u8]) {
        self.summary.entries += 1;
        self.summary.data_size += (key.len() + value.len()) as u64;

        // Undecodable keys count as their own row
        let row = self.format.safe_split_key(key).unwrap_or(key);
        if self.last_row.as_deref() != Some(row) {
            self.summary.rows += 1;
            self.last_row = Some(row.to_vec());
        }
    }

    pub fn summary(&self) -> BulkOpSummary {
        self.summary
    }

    pub fn reset(&mut self) {
        self.summary = BulkOpSummary::default();
        self.last_row = None;
    }
}
