use bytes::Bytes;

use crate::error::{FrameError, Result};

/// End-of-record marker used by the heating controller.
pub const DEFAULT_TERMINATOR: &[u8] = b";22;1;%;";

/// A fixed byte sequence marking the end of a message.
///
/// Searching uses a precomputed prefix table so a partial match that fails
/// part-way (`;22;;22;1;%;`) never needs to back up over bytes already seen.
/// That is what lets the search run over a list of chunks as if it were one
/// contiguous buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminator {
    pattern: Bytes,
    prefix: Vec<usize>,
}

impl Terminator {
    /// Build a terminator from a non-empty byte pattern.
    pub fn new(pattern: impl Into<Bytes>) -> Result<Self> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(FrameError::EmptyTerminator);
        }
        Ok(Self::build(pattern))
    }

    fn build(pattern: Bytes) -> Self {
        let prefix = prefix_table(&pattern);
        Self { pattern, prefix }
    }

    /// The raw pattern bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pattern
    }

    /// Pattern length in bytes (never zero).
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    /// Find the first match starting at or after `from` in a single buffer.
    ///
    /// Returns the offset of the first terminator byte.
    pub fn find(&self, haystack: &[u8], from: usize) -> Option<usize> {
        self.find_in([haystack], from)
    }

    /// Find the first match starting at or after `from` in the logical
    /// concatenation of `chunks`.
    pub fn find_in<'a, I>(&self, chunks: I, from: usize) -> Option<usize>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        self.find_in_at(chunks, 0, from)
    }

    /// Like [`find_in`](Self::find_in), for chunks whose first byte sits at
    /// logical offset `base`. `from` and the result are logical offsets.
    ///
    /// Lets a caller that already knows which chunk holds `from` skip the
    /// chunks before it.
    pub fn find_in_at<'a, I>(&self, chunks: I, base: usize, from: usize) -> Option<usize>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let pattern = self.pattern.as_ref();
        let mut matched = 0usize;
        let mut chunk_start = base;

        for chunk in chunks {
            let chunk_end = chunk_start + chunk.len();
            if chunk_end <= from {
                chunk_start = chunk_end;
                continue;
            }

            let skip = from.saturating_sub(chunk_start);
            for (i, &byte) in chunk.iter().enumerate().skip(skip) {
                while matched > 0 && byte != pattern[matched] {
                    matched = self.prefix[matched - 1];
                }
                if byte == pattern[matched] {
                    matched += 1;
                }
                if matched == pattern.len() {
                    return Some(chunk_start + i + 1 - pattern.len());
                }
            }
            chunk_start = chunk_end;
        }
        None
    }

    /// Where to restart a search after `scanned` bytes were searched without a match.
    ///
    /// A terminator may still begin in the last `len() - 1` bytes.
    pub fn resume_offset(&self, scanned: usize) -> usize {
        scanned.saturating_sub(self.pattern.len() - 1)
    }
}

impl Default for Terminator {
    fn default() -> Self {
        Self::build(Bytes::from_static(DEFAULT_TERMINATOR))
    }
}

fn prefix_table(pattern: &[u8]) -> Vec<usize> {
    let mut table = vec![0usize; pattern.len()];
    let mut k = 0usize;
    for i in 1..pattern.len() {
        while k > 0 && pattern[i] != pattern[k] {
            k = table[k - 1];
        }
        if pattern[i] == pattern[k] {
            k += 1;
        }
        table[i] = k;
    }
    table
}
