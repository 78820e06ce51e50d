//! File-range leaf backing.

use crate::descriptor::{DescriptorKind, SharedDescriptor};
use crate::error::StorageResult;
use crate::source::ByteSource;
use std::fs::File;
use std::ops::Range;
use std::path::Path;

/// An immutable view of a byte range within a shared descriptor.
///
/// Slicing only narrows the stored range; no bytes are read and the
/// descriptor is shared with the original.
///
/// # Example
///
/// ```no_run
/// use splicebuf_storage::{ByteSource, DescriptorKind, FileRangeBacking};
/// use std::path::Path;
///
/// let backing = FileRangeBacking::open(Path::new("image.bin"), DescriptorKind::File).unwrap();
/// let header = backing.slice(0..16);
/// let bytes = header.read_range(0..16).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FileRangeBacking {
    descriptor: SharedDescriptor,
    range: Range<u64>,
}

impl FileRangeBacking {
    /// Opens `path` read-only and covers its whole contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or inspected.
    pub fn open(path: &Path, kind: DescriptorKind) -> StorageResult<Self> {
        Ok(Self::whole(SharedDescriptor::open(path, kind)?))
    }

    /// Wraps an open file, covering its whole contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be inspected.
    pub fn from_file(file: File, kind: DescriptorKind) -> StorageResult<Self> {
        Ok(Self::whole(SharedDescriptor::from_file(file, kind)?))
    }

    /// Covers the whole of an existing descriptor.
    #[must_use]
    pub fn whole(descriptor: SharedDescriptor) -> Self {
        let range = 0..descriptor.size();
        Self { descriptor, range }
    }

    /// Returns the descriptor this range reads from.
    #[must_use]
    pub fn descriptor(&self) -> &SharedDescriptor {
        &self.descriptor
    }

    /// Returns the absolute range within the descriptor.
    #[must_use]
    pub fn range(&self) -> Range<u64> {
        self.range.clone()
    }

    /// Returns `true` if the range is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Narrows the view to `range`, relative to this backing.
    #[must_use]
    pub fn slice(&self, range: Range<u64>) -> Self {
        let start = self.range.start + range.start.min(self.size());
        let end = self.range.start + range.end.min(self.size());

        debug_assert!(end <= self.range.end);

        Self {
            descriptor: self.descriptor.clone(),
            range: start..end.max(start),
        }
    }
}

impl ByteSource for FileRangeBacking {
    fn size(&self) -> u64 {
        self.range.end - self.range.start
    }

    fn read_into(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        let remaining = self.size().saturating_sub(offset);
        let len = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));

        if len == 0 {
            return Ok(0);
        }

        self.descriptor
            .read_at(self.range.start + offset, &mut buf[..len])
    }
}
