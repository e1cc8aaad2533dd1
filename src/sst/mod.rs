//! SST Module
//!
//! Sorted String Table - immutable in-memory sorted key-value payloads,
//! the unit handed to a store for atomic ingestion.
//!
//! ## Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "BSST" (4) | Version: u16 (2) | Count: u64 (8) │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [KeyLen: u32][ValLen: u32][Key][Value]                │
//! │   ... repeated for each entry ...                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block (variable)                                  │
//! │   [KeyLen: u32][Offset: u64][Key]                       │
//! │   ... repeated for each entry ...                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                       │
//! │   IndexOffset: u64 (8) | DataCRC: u32 (4) | Padding (4) │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod iterator;
mod reader;
mod writer;

pub use iterator::SstIter;
pub use reader::SstReader;
pub use writer::SstWriter;

// =============================================================================
// Shared Constants (used by writer, reader, iterator)
// =============================================================================

/// Magic bytes identifying an SST payload
pub(crate) const MAGIC: &[u8; 4] = b"BSST";

/// Current SST format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + EntryCount (8) = 14 bytes
pub(crate) const HEADER_SIZE: usize = 14;

/// Footer size: IndexOffset (8) + DataCRC (4) + Padding (4) = 16 bytes
pub(crate) const FOOTER_SIZE: usize = 16;

/// Per-entry framing in the data block: KeyLen (4) + ValLen (4)
pub(crate) const ENTRY_HEADER_SIZE: usize = 8;

/// Read a little-endian u32 at `pos`
pub(crate) fn read_u32(buf: &[u8], pos: usize) -> Option<u32> {
    let bytes = buf.get(pos..pos + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Read a little-endian u64 at `pos`
pub(crate) fn read_u64(buf: &[u8], pos: usize) -> Option<u64> {
    let bytes = buf.get(pos..pos + 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Some(u64::from_le_bytes(raw))
}
