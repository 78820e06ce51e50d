//! Byte source trait definition.

use crate::error::{StorageError, StorageResult};
use std::io;
use std::ops::Range;

/// A randomly addressable, read-only sequence of bytes.
///
/// Byte sources are the read interface shared by every leaf and by the
/// composite backings built on top of them. Searching and writing only
/// ever go through this trait.
///
/// # Invariants
///
/// - `size` is constant for the lifetime of the value
/// - `read_into` never returns more than `size - offset` bytes
/// - A short count from `read_into` means the underlying data is exhausted
pub trait ByteSource {
    /// Returns the number of bytes in the source.
    fn size(&self) -> u64;

    /// Reads bytes starting at `offset` into `buf`.
    ///
    /// Returns the number of bytes read, which is the smaller of
    /// `buf.len()` and the bytes remaining after `offset`, unless the
    /// underlying storage runs out early.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs or the descriptor is closed.
    fn read_into(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize>;

    /// Reads exactly the bytes in `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The range extends beyond the end of the source
    /// - The underlying storage ends before the range is filled
    /// - An I/O error occurs
    fn read_range(&self, range: Range<u64>) -> StorageResult<Vec<u8>> {
        let size = self.size();

        if range.start > range.end || range.end > size {
            return Err(StorageError::OutOfBounds {
                offset: range.start,
                len: range.end.saturating_sub(range.start),
                size,
            });
        }

        let len = usize::try_from(range.end - range.start).map_err(|_| {
            io::Error::new(io::ErrorKind::OutOfMemory, "range does not fit in memory")
        })?;

        let mut buffer = vec![0u8; len];
        let read = self.read_into(range.start, &mut buffer)?;

        if read != len {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {len} bytes at offset {}, got {read}", range.start),
            )));
        }

        Ok(buffer)
    }
}

impl<T: ByteSource + ?Sized> ByteSource for &T {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read_into(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        (**self).read_into(offset, buf)
    }
}
