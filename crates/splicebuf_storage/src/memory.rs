//! In-memory leaf backing.

use crate::error::StorageResult;
use crate::source::ByteSource;
use std::ops::Range;

/// A contiguous, owned block of bytes.
///
/// Memory backings are the only leaves that are ever mutated in place.
/// Slicing always copies, so no two backings share a store and an edit to
/// one never shows through another.
///
/// # Example
///
/// ```rust
/// use splicebuf_storage::{ByteSource, MemoryBacking};
///
/// let mut backing = MemoryBacking::from(b"hello".to_vec());
/// backing.replace_range(1..4, b"ipp");
/// assert_eq!(backing.as_slice(), b"hippo");
/// assert_eq!(backing.size(), 5);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryBacking {
    data: Vec<u8>,
}

impl MemoryBacking {
    /// Creates a new empty memory backing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the backing holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the bytes as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the backing and returns its bytes.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Returns a copy of the bytes in `range`.
    ///
    /// The range is clamped to the backing.
    #[must_use]
    pub fn slice(&self, range: Range<u64>) -> Self {
        let range = self.clamp(range);
        Self {
            data: self.data[range].to_vec(),
        }
    }

    /// Replaces the bytes in `range` with `bytes`, in place.
    pub fn replace_range(&mut self, range: Range<u64>, bytes: &[u8]) {
        debug_assert!(range.start <= range.end && range.end <= self.size());
        let range = self.clamp(range);
        self.data.splice(range, bytes.iter().copied());
    }

    /// Appends the bytes of another memory backing.
    pub fn append(&mut self, other: &MemoryBacking) {
        self.data.extend_from_slice(&other.data);
    }

    fn clamp(&self, range: Range<u64>) -> Range<usize> {
        let len = self.data.len();
        let start = usize::try_from(range.start).unwrap_or(usize::MAX).min(len);
        let end = usize::try_from(range.end).unwrap_or(usize::MAX).min(len);
        start..end.max(start)
    }
}

impl From<Vec<u8>> for MemoryBacking {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl From<&[u8]> for MemoryBacking {
    fn from(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }
}

impl ByteSource for MemoryBacking {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_into(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        let end = offset.saturating_add(buf.len() as u64);
        let range = self.clamp(offset..end);
        let count = range.len();

        buf[..count].copy_from_slice(&self.data[range]);
        Ok(count)
    }
}
