//! SST Reader
//!
//! Validates an SST payload and provides O(log n) key lookups via its index.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{BulkError, Result};

use super::iterator::SstIter;
use super::{read_u32, read_u64, ENTRY_HEADER_SIZE, FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Reader over an immutable SST payload
///
/// Cloning is cheap: the payload and the decoded index are shared.
#[derive(Clone)]
pub struct SstReader {
    data: Bytes,
    /// Decoded index: key → offset of entry, in key order
    index: Arc<Vec<(Vec<u8>, usize)>>,
    /// End of the data block (start of index block)
    index_offset: usize,
}

impl SstReader {
    /// Open an SST payload for reading
    ///
    /// Checks magic, version and the data block checksum, and decodes the
    /// whole index into memory.
    pub fn open(data: Bytes) -> Result<Self> {
        if data.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(BulkError::Corruption(format!(
                "SST payload too short: {} bytes",
                data.len()
            )));
        }

        if &data[0..4] != MAGIC {
            return Err(BulkError::Corruption(format!(
                "Invalid SST magic: expected BSST, got {:?}",
                &data[0..4]
            )));
        }

        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != VERSION {
            return Err(BulkError::Corruption(format!(
                "Unsupported SST version: {}",
                version
            )));
        }

        let entry_count = read_u64(&data, 6).unwrap_or_default();

        // Footer: index_offset (8) + data_crc (4) + padding (4)
        let footer_start = data.len() - FOOTER_SIZE;
        let index_offset = read_u64(&data, footer_start).unwrap_or_default() as usize;
        let data_crc = read_u32(&data, footer_start + 8).unwrap_or_default();

        if index_offset < HEADER_SIZE || index_offset > footer_start {
            return Err(BulkError::Corruption(format!(
                "SST index offset {} out of bounds",
                index_offset
            )));
        }

        let actual_crc = crc32fast::hash(&data[HEADER_SIZE..index_offset]);
        if actual_crc != data_crc {
            return Err(BulkError::Corruption(format!(
                "SST data checksum mismatch: expected {:#010x}, got {:#010x}",
                data_crc, actual_crc
            )));
        }

        // Parse index entries: [key_len(4)][offset(8)][key]
        let index_block = &data[index_offset..footer_start];
        let mut index: Vec<(Vec<u8>, usize)> = Vec::with_capacity(entry_count as usize);
        let mut pos = 0;
        while pos < index_block.len() {
            let truncated = || BulkError::Corruption("truncated SST index entry".to_string());

            let key_len = read_u32(index_block, pos).ok_or_else(truncated)? as usize;
            pos += 4;
            let offset = read_u64(index_block, pos).ok_or_else(truncated)? as usize;
            pos += 8;
            let key = index_block.get(pos..pos + key_len).ok_or_else(truncated)?;
            pos += key_len;

            if offset < HEADER_SIZE || offset + ENTRY_HEADER_SIZE > index_offset {
                return Err(BulkError::Corruption(format!(
                    "SST entry offset {} out of bounds",
                    offset
                )));
            }
            if let Some((prev, _)) = index.last() {
                if key <= prev.as_slice() {
                    return Err(BulkError::Corruption("SST index out of order".to_string()));
                }
            }
            index.push((key.to_vec(), offset));
        }

        if index.len() as u64 != entry_count {
            return Err(BulkError::Corruption(format!(
                "SST header declares {} entries, index has {}",
                entry_count,
                index.len()
            )));
        }

        Ok(Self {
            data,
            index: Arc::new(index),
            index_offset,
        })
    }

    /// Get a value by key: O(log n) lookup via the index
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        match self.index.binary_search_by(|(k, _)| k.as_slice().cmp(key)) {
            Ok(pos) => {
                let (_, value) = self.entry_at(pos)?;
                Ok(Some(value))
            }
            Err(_) => Ok(None),
        }
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    /// Get the minimum key
    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.first().map(|(k, _)| k.as_slice())
    }

    /// Get the maximum key
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.last().map(|(k, _)| k.as_slice())
    }

    /// The raw payload
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Create a cursor over all entries, unpositioned
    pub fn iter(&self) -> SstIter {
        SstIter::new(self.clone())
    }

    /// Position of the first entry with key >= `key`
    pub(super) fn seek_position(&self, key: &[u8]) -> usize {
        self.index.partition_point(|(k, _)| k.as_slice() < key)
    }

    /// Decode the entry at index position `pos`
    pub(super) fn entry_at(&self, pos: usize) -> Result<(Bytes, Bytes)> {
        let (_, offset) = self.index.get(pos).ok_or_else(|| {
            BulkError::Corruption(format!("SST entry {} does not exist", pos))
        })?;
        let offset = *offset;

        let truncated = || BulkError::Corruption(format!("truncated SST entry at {}", offset));
        let key_len = read_u32(&self.data, offset).ok_or_else(truncated)? as usize;
        let val_len = read_u32(&self.data, offset + 4).ok_or_else(truncated)? as usize;

        let key_start = offset + ENTRY_HEADER_SIZE;
        let val_start = key_start + key_len;
        let val_end = val_start + val_len;
        if val_end > self.index_offset {
            return Err(truncated());
        }

        Ok((
            self.data.slice(key_start..val_start),
            self.data.slice(val_start..val_end),
        ))
    }

    pub(super) fn len(&self) -> usize {
        self.index.len()
    }
}
