//! Key helpers
//!
//! Byte-key successors and safe split key derivation.
//!
//! ## Row keys with column families
//! ```text
//! ┌──────────────────────┬──────────────────┬────────────┐
//! │ Row prefix           │ Family suffix    │ Len (1)    │
//! │ (shared by the row)  │ (n bytes)        │ = n        │
//! └──────────────────────┴──────────────────┴────────────┘
//! ```
//! All keys of one row share the row prefix; a flush must never fall
//! between them.

use crate::error::{BulkError, Result};

/// The smallest key strictly greater than `key`
pub fn next_key(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0);
    next
}

/// The smallest key greater than every key prefixed by `key`
///
/// Trailing 0xff bytes are dropped before incrementing. A key made only of
/// 0xff bytes (or the empty key) has no prefix end and is returned as is.
pub fn prefix_end(key: &[u8]) -> Vec<u8> {
    let mut end = key.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < 0xff {
            *last += 1;
            return end;
        }
        end.pop();
    }
    key.to_vec()
}

/// Build a row key with a single-byte column family suffix
pub fn family_key(row: &[u8], family: u8) -> Vec<u8> {
    let mut key = Vec::with_capacity(row.len() + 2);
    key.extend_from_slice(row);
    key.push(family);
    key.push(1);
    key
}

/// How keys map onto logical rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitKeyFormat {
    /// Every key is its own row
    #[default]
    Raw,

    /// The last byte is the length of a column family suffix before it
    FamilySuffix,
}

impl SplitKeyFormat {
    /// Normalize `key` to the start of its row
    pub fn safe_split_key<'a>(&self, key: &'a [u8]) -> Result<&'a [u8]> {
        match self {
            SplitKeyFormat::Raw => Ok(key),
            SplitKeyFormat::FamilySuffix => {
                let (&suffix_len, rest) = key.split_last().ok_or_else(|| {
                    BulkError::MalformedKey("empty key has no column family suffix".to_string())
                })?;
                let suffix_len = suffix_len as usize;
                if suffix_len > rest.len() {
                    return Err(BulkError::MalformedKey(format!(
                        "key {} declares a {} byte family suffix",
                        key.escape_ascii(),
                        suffix_len
                    )));
                }
                Ok(&rest[..rest.len() - suffix_len])
            }
        }
    }

    /// Whether `a` and `b` belong to the same row. Undecodable keys never do.
    pub fn same_row(&self, a: &[u8], b: &[u8]) -> bool {
        match (self.safe_split_key(a), self.safe_split_key(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}
