//! SST Iterator
//!
//! Seekable cursor over the entries of an SST in sorted key order.

use bytes::Bytes;

use crate::error::{BulkError, Result};

use super::reader::SstReader;

/// Cursor over SST entries
///
/// Unpositioned until the first `seek_ge()`. A decode error invalidates the
/// cursor and is reported by `valid()`. Single owner, not reentrant: the
/// split-retry path hands one cursor over the original payload from split to
/// split.
pub struct SstIter {
    reader: SstReader,
    /// Index position of the current entry
    pos: usize,
    /// Decoded current entry, `None` when exhausted or unpositioned
    current: Option<(Bytes, Bytes)>,
    err: Option<String>,
}

impl SstIter {
    pub(super) fn new(reader: SstReader) -> Self {
        let pos = reader.len();
        Self {
            reader,
            pos,
            current: None,
            err: None,
        }
    }

    /// Position at the first entry with key >= `key`
    pub fn seek_ge(&mut self, key: &[u8]) {
        self.err = None;
        self.pos = self.reader.seek_position(key);
        self.load();
    }

    /// Advance to the next entry
    pub fn next(&mut self) {
        if self.current.is_none() {
            return;
        }
        self.pos += 1;
        self.load();
    }

    /// Whether the cursor is positioned at an entry
    pub fn valid(&self) -> Result<bool> {
        if let Some(err) = &self.err {
            return Err(BulkError::Corruption(err.clone()));
        }
        Ok(self.current.is_some())
    }

    /// Current key; empty when not valid
    pub fn key(&self) -> &[u8] {
        self.current.as_ref().map(|(k, _)| k.as_ref()).unwrap_or_default()
    }

    /// Current value; empty when not valid
    pub fn value(&self) -> &[u8] {
        self.current.as_ref().map(|(_, v)| v.as_ref()).unwrap_or_default()
    }

    fn load(&mut self) {
        self.current = None;
        if self.pos >= self.reader.len() {
            return;
        }
        match self.reader.entry_at(self.pos) {
            Ok(entry) => self.current = Some(entry),
            Err(BulkError::Corruption(msg)) => self.err = Some(msg),
            Err(e) => self.err = Some(e.to_string()),
        }
    }
}
