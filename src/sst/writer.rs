//! SST Writer
//!
//! Buffers sorted key-value entries into an in-memory SST payload.

use bytes::Bytes;

use crate::error::{BulkError, Result};

use super::{HEADER_SIZE, MAGIC, VERSION};

/// Writer for in-memory SSTs
///
/// Call `put()` in strictly increasing key order, then `finish()` once to
/// obtain the immutable payload. A finished or closed writer rejects
/// further use; the batcher replaces it on every reset.
pub struct SstWriter {
    /// Header + data block; index and footer are appended by finish
    buf: Vec<u8>,
    /// Index: key → offset of entry
    index: Vec<(Vec<u8>, u64)>,
    /// Running CRC hasher for data section
    data_hasher: crc32fast::Hasher,
    state: WriterState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Finished,
    Closed,
}

impl SstWriter {
    /// Create a new writer with the header already written
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(4096);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes()); // Placeholder for entry count

        Self {
            buf,
            index: Vec::new(),
            data_hasher: crc32fast::Hasher::new(),
            state: WriterState::Open,
        }
    }

    /// Add a key-value pair (must be called in strictly increasing key order)
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_open("put")?;

        if let Some((last, _)) = self.index.last() {
            if key <= last.as_slice() {
                return Err(BulkError::Writer(format!(
                    "key {} is not after {}",
                    key.escape_ascii(),
                    last.escape_ascii()
                )));
            }
        }
        if key.len() > u32::MAX as usize || value.len() > u32::MAX as usize {
            return Err(BulkError::Writer("entry too large".to_string()));
        }

        let offset = self.buf.len() as u64;
        self.index.push((key.to_vec(), offset));

        let key_len_bytes = (key.len() as u32).to_le_bytes();
        let val_len_bytes = (value.len() as u32).to_le_bytes();

        self.buf.extend_from_slice(&key_len_bytes);
        self.buf.extend_from_slice(&val_len_bytes);
        self.buf.extend_from_slice(key);
        self.buf.extend_from_slice(value);

        self.data_hasher.update(&key_len_bytes);
        self.data_hasher.update(&val_len_bytes);
        self.data_hasher.update(key);
        self.data_hasher.update(value);

        Ok(())
    }

    /// Bytes written to the data block so far
    ///
    /// Only meaningful while the writer is open; a finished or closed writer
    /// reports 0.
    pub fn data_size(&self) -> u64 {
        match self.state {
            WriterState::Open => (self.buf.len() - HEADER_SIZE) as u64,
            _ => 0,
        }
    }

    /// Number of entries written
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Finish building: write index block, footer, and return the payload
    pub fn finish(&mut self) -> Result<Bytes> {
        self.ensure_open("finish")?;
        self.state = WriterState::Finished;

        let mut buf = std::mem::take(&mut self.buf);
        let index = std::mem::take(&mut self.index);
        let entry_count = index.len() as u64;

        // Record where index block starts
        let index_offset = buf.len() as u64;

        // Index block: [key_len(4)][offset(8)][key] for each entry
        for (key, offset) in &index {
            buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
            buf.extend_from_slice(&offset.to_le_bytes());
            buf.extend_from_slice(key);
        }

        let hasher = std::mem::replace(&mut self.data_hasher, crc32fast::Hasher::new());
        let data_crc = hasher.finalize();

        // Footer: index_offset (8) + data_crc (4) + padding (4)
        buf.extend_from_slice(&index_offset.to_le_bytes());
        buf.extend_from_slice(&data_crc.to_le_bytes());
        buf.extend_from_slice(&[0u8; 4]);

        // Patch entry count in header (after magic + version)
        buf[6..HEADER_SIZE].copy_from_slice(&entry_count.to_le_bytes());

        Ok(Bytes::from(buf))
    }

    /// Release buffered data without producing a payload. Idempotent.
    pub fn close(&mut self) {
        self.buf = Vec::new();
        self.index = Vec::new();
        self.state = WriterState::Closed;
    }

    fn ensure_open(&self, op: &str) -> Result<()> {
        match self.state {
            WriterState::Open => Ok(()),
            WriterState::Finished => Err(BulkError::Writer(format!("{} after finish", op))),
            WriterState::Closed => Err(BulkError::Writer(format!("{} after close", op))),
        }
    }
}

impl Default for SstWriter {
    fn default() -> Self {
        Self::new()
    }
}

