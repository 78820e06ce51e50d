//! Pull-based byte streaming.

use crate::buffer::DataBuffer;
use crate::error::CoreResult;
use std::iter::FusedIterator;
use std::ops::Range;
use std::vec;

/// Iterator over a buffer range in bounded chunks.
///
/// Each call to `next` locks the buffer just long enough to read one chunk.
/// If the buffer shrinks below the remaining range in between, the next
/// chunk is an out-of-bounds error and iteration ends.
#[derive(Debug)]
pub struct Chunks<'a> {
    buffer: &'a DataBuffer,
    remaining: Range<u64>,
    chunk_size: u64,
    done: bool,
}

impl<'a> Chunks<'a> {
    pub(crate) fn new(buffer: &'a DataBuffer, range: Range<u64>, chunk_size: usize) -> Self {
        Self {
            buffer,
            remaining: range,
            chunk_size: chunk_size.max(1) as u64,
            done: false,
        }
    }

    /// Returns the part of the range not yet read.
    #[must_use]
    pub fn remaining(&self) -> Range<u64> {
        self.remaining.clone()
    }
}

impl Iterator for Chunks<'_> {
    type Item = CoreResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining.is_empty() {
            return None;
        }

        let start = self.remaining.start;
        let end = start.saturating_add(self.chunk_size).min(self.remaining.end);

        match self.buffer.read(start..end) {
            Ok(chunk) => {
                self.remaining.start = end;
                Some(Ok(chunk))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for Chunks<'_> {}

/// Iterator over the bytes of a buffer range, read in chunks.
#[derive(Debug)]
pub struct Bytes<'a> {
    chunks: Chunks<'a>,
    current: vec::IntoIter<u8>,
}

impl<'a> Bytes<'a> {
    pub(crate) fn new(chunks: Chunks<'a>) -> Self {
        Self {
            chunks,
            current: Vec::new().into_iter(),
        }
    }
}

impl Iterator for Bytes<'_> {
    type Item = CoreResult<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(byte) = self.current.next() {
                return Some(Ok(byte));
            }

            match self.chunks.next()? {
                Ok(chunk) => self.current = chunk.into_iter(),
                Err(err) => return Some(Err(err)),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let pending = self.current.len();
        let remaining = usize::try_from(self.chunks.remaining.end - self.chunks.remaining.start)
            .unwrap_or(usize::MAX);
        (pending, pending.checked_add(remaining))
    }
}

impl FusedIterator for Bytes<'_> {}
