//! The backing union and its splice algorithm.
//!
//! A [`Backing`] is the logical content of a buffer: a memory block, a
//! range of a file, or an ordered chain of those. Edits never copy file
//! bytes; they cut the chain at the edit boundaries and reassemble it
//! around the new content, then compact the result:
//!
//! - empty children are dropped
//! - consecutive memory children are merged
//! - nested composites are flattened
//! - a chain of one collapses to that child, a chain of none to empty memory

use splicebuf_storage::{
    ByteSource, DescriptorKind, FileId, FileRangeBacking, MemoryBacking, StorageError,
    StorageResult,
};
use std::fs::File;
use std::ops::Range;
use std::path::Path;
use tracing::trace;

/// The content of a buffer.
#[derive(Debug, Clone)]
pub enum Backing {
    /// An owned block of bytes.
    Memory(MemoryBacking),
    /// A range of an open file or resource fork.
    FileRange(FileRangeBacking),
    /// An ordered chain of children whose sizes sum to the total.
    Composite(Vec<Backing>),
}

impl Default for Backing {
    fn default() -> Self {
        Self::Memory(MemoryBacking::new())
    }
}

impl Backing {
    /// Creates a memory backing from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Memory(MemoryBacking::from(bytes.into()))
    }

    /// Opens `path` read-only and backs the whole file (or resource fork).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or inspected.
    pub fn open(path: &Path, kind: DescriptorKind) -> StorageResult<Self> {
        Ok(Self::FileRange(FileRangeBacking::open(path, kind)?))
    }

    /// Backs the whole of an already open file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be inspected.
    pub fn from_file(file: File, kind: DescriptorKind) -> StorageResult<Self> {
        Ok(Self::FileRange(FileRangeBacking::from_file(file, kind)?))
    }

    /// Returns the number of bytes in the backing.
    #[must_use]
    pub fn size(&self) -> u64 {
        match self {
            Self::Memory(backing) => backing.size(),
            Self::FileRange(backing) => backing.size(),
            Self::Composite(children) => children.iter().map(Backing::size).sum(),
        }
    }

    /// Returns `true` if the backing holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Reads exactly the bytes in `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds or a file read fails.
    pub fn read(&self, range: Range<u64>) -> StorageResult<Vec<u8>> {
        self.read_range(range)
    }

    /// Returns the children of a composite, or the backing itself.
    #[must_use]
    pub fn children(&self) -> &[Backing] {
        match self {
            Self::Composite(children) => children,
            _ => std::slice::from_ref(self),
        }
    }

    /// Returns the leaves (memory and file-range backings) in order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Backing> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Backing>) {
        match self {
            Self::Composite(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
            leaf => out.push(leaf),
        }
    }

    /// Returns every file-range leaf in order.
    pub fn file_ranges(&self) -> impl Iterator<Item = &FileRangeBacking> {
        self.leaves().into_iter().filter_map(|leaf| match leaf {
            Self::FileRange(backing) => Some(backing),
            _ => None,
        })
    }

    /// Returns the first file-range leaf, if any.
    #[must_use]
    pub fn first_file_range(&self) -> Option<&FileRangeBacking> {
        self.file_ranges().next()
    }

    /// Returns `true` if any leaf reads the regular contents of the file
    /// identified by `id`.
    #[must_use]
    pub fn references_file(&self, id: FileId) -> bool {
        self.file_ranges()
            .any(|backing| backing.descriptor().is_contents_of(id))
    }

    /// Returns a backing for exactly `range`, without reading file bytes.
    ///
    /// Memory is copied; file ranges are narrowed and keep sharing their
    /// descriptor.
    #[must_use]
    pub fn slice(&self, range: Range<u64>) -> Backing {
        debug_assert!(range.start <= range.end && range.end <= self.size());

        match self {
            Self::Memory(backing) => Self::Memory(backing.slice(range)),
            Self::FileRange(backing) => Self::FileRange(backing.slice(range)),
            Self::Composite(children) => {
                let sliced = overlaps(children, range)
                    .map(|(child, subrange)| child.slice(subrange))
                    .collect();
                Self::compacted(sliced)
            }
        }
    }

    /// Replaces the bytes in `range` with `bytes`.
    pub fn replace_with_bytes(&mut self, range: Range<u64>, bytes: &[u8]) {
        self.replace_range(range, Self::from_bytes(bytes));
    }

    /// Replaces the bytes in `range` with the content of `new`.
    ///
    /// Afterwards the size is `size - range.len() + new.size()`, and bytes
    /// outside `range` read the same as before.
    ///
    /// When `range` spans several children of a composite, the first
    /// overlapping child receives `new` and the later ones are only
    /// truncated.
    pub fn replace_range(&mut self, range: Range<u64>, new: Backing) {
        debug_assert!(range.start <= range.end && range.end <= self.size());
        trace!(?range, new_size = new.size(), "splicing backing");

        if let (Self::Memory(backing), Self::Memory(other)) = (&mut *self, &new) {
            backing.replace_range(range, other.as_slice());
            return;
        }

        *self = match std::mem::take(self) {
            Self::Composite(children) => Self::splice_children(children, range, new),
            leaf => {
                let size = leaf.size();
                let before = leaf.slice(0..range.start);
                let after = leaf.slice(range.end..size);
                Self::compacted(vec![before, new, after])
            }
        };
    }

    fn splice_children(children: Vec<Backing>, range: Range<u64>, new: Backing) -> Backing {
        let mut prefix = Vec::with_capacity(children.len() + 2);
        let mut suffix = Vec::new();
        let mut replacement = Some(new);
        let mut cursor = 0;

        for mut child in children {
            let next = cursor + child.size();

            if range.start >= next {
                prefix.push(child);
            } else if range.end <= cursor {
                suffix.push(child);
            } else {
                let local = (range.start.max(cursor) - cursor)..(range.end.min(next) - cursor);
                let content = replacement.take().unwrap_or_default();
                child.replace_range(local, content);
                prefix.push(child);
            }

            cursor = next;
        }

        if let Some(new) = replacement {
            prefix.push(new);
        }
        prefix.extend(suffix);

        Self::compacted(prefix)
    }

    /// Builds a compacted backing from a sequence of pieces.
    #[must_use]
    pub fn compacted(pieces: Vec<Backing>) -> Backing {
        let mut out = Vec::with_capacity(pieces.len());
        for piece in pieces {
            piece.compact_into(&mut out);
        }

        match out.len() {
            0 => Self::default(),
            1 => out.pop().unwrap_or_default(),
            _ => Self::Composite(out),
        }
    }

    fn compact_into(self, out: &mut Vec<Backing>) {
        match self {
            Self::Memory(backing) => {
                if backing.is_empty() {
                    return;
                }
                if let Some(Self::Memory(previous)) = out.last_mut() {
                    previous.append(&backing);
                } else {
                    out.push(Self::Memory(backing));
                }
            }
            Self::FileRange(backing) => {
                if !backing.is_empty() {
                    out.push(Self::FileRange(backing));
                }
            }
            Self::Composite(children) => {
                for child in children {
                    child.compact_into(out);
                }
            }
        }
    }

    /// Returns `true` if the backing is in compacted form: a composite has
    /// at least two children, none empty, none nested, and no two adjacent
    /// memory children.
    #[must_use]
    pub fn is_compact(&self) -> bool {
        match self {
            Self::Composite(children) => {
                children.len() >= 2
                    && children
                        .iter()
                        .all(|child| !child.is_empty() && !matches!(child, Self::Composite(_)))
                    && children
                        .windows(2)
                        .all(|pair| !matches!(pair, [Self::Memory(_), Self::Memory(_)]))
            }
            _ => true,
        }
    }

    /// Copies all content into a single memory block.
    ///
    /// # Errors
    ///
    /// Returns an error if a file read fails.
    pub fn to_memory(&self) -> StorageResult<Backing> {
        match self {
            Self::Memory(_) => Ok(self.clone()),
            _ => Ok(Self::from_bytes(self.read(0..self.size())?)),
        }
    }

    /// Feeds the content to `f` in order, in chunks of at most
    /// `chunk_size` bytes for file-backed leaves.
    ///
    /// # Errors
    ///
    /// Returns the first error from a file read or from `f`.
    pub fn try_for_each_chunk<E, F>(&self, chunk_size: usize, f: &mut F) -> Result<(), E>
    where
        E: From<StorageError>,
        F: FnMut(&[u8]) -> Result<(), E>,
    {
        match self {
            Self::Memory(backing) => f(backing.as_slice()),
            Self::FileRange(backing) => {
                let size = backing.size();
                let step = chunk_size.max(1) as u64;
                let mut offset = 0;

                while offset < size {
                    let end = (offset + step).min(size);
                    f(&backing.read_range(offset..end)?)?;
                    offset = end;
                }

                Ok(())
            }
            Self::Composite(children) => {
                for child in children {
                    child.try_for_each_chunk(chunk_size, f)?;
                }
                Ok(())
            }
        }
    }

    /// Closes every descriptor referenced by the backing.
    ///
    /// Returns the number of descriptors this call actually closed; siblings
    /// sharing a descriptor close it once.
    pub fn close(&self) -> usize {
        self.file_ranges()
            .filter(|backing| backing.descriptor().close())
            .count()
    }
}

impl From<Vec<u8>> for Backing {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl ByteSource for Backing {
    fn size(&self) -> u64 {
        Backing::size(self)
    }

    fn read_into(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        match self {
            Self::Memory(backing) => backing.read_into(offset, buf),
            Self::FileRange(backing) => backing.read_into(offset, buf),
            Self::Composite(children) => {
                let size = Backing::size(self);
                let end = offset.saturating_add(buf.len() as u64).min(size);
                let mut written = 0;

                for (child, subrange) in overlaps(children, offset.min(end)..end) {
                    let len = (subrange.end - subrange.start) as usize;
                    let read = child.read_into(subrange.start, &mut buf[written..written + len])?;
                    written += read;

                    if read < len {
                        return Err(StorageError::Io(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "file ended before its range",
                        )));
                    }
                }

                Ok(written)
            }
        }
    }
}

/// Yields every non-empty child overlapping `range`, with the overlap
/// expressed relative to that child.
fn overlaps(children: &[Backing], range: Range<u64>) -> impl Iterator<Item = (&Backing, Range<u64>)> {
    let (lower, upper) = (range.start, range.end);

    children
        .iter()
        .scan(0u64, |cursor, child| {
            let span = *cursor..*cursor + child.size();
            *cursor = span.end;
            Some((child, span))
        })
        .take_while(move |(_, span)| span.start < upper)
        .filter_map(move |(child, span)| {
            let start = lower.max(span.start);
            let end = upper.min(span.end);
            (start < end).then(|| (child, (start - span.start)..(end - span.start)))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_backing(contents: &[u8]) -> (NamedTempFile, Backing) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();

        let backing = Backing::open(file.path(), DescriptorKind::File).unwrap();
        (file, backing)
    }

    fn contents(backing: &Backing) -> Vec<u8> {
        backing.read(0..backing.size()).unwrap()
    }

    fn check_mutations(mut make: impl FnMut(&[u8]) -> Backing) {
        let original: Vec<u8> = (0..10).collect();

        let mut backing = make(&original);
        backing.replace_with_bytes(0..3, &[]);
        assert_eq!(backing.size(), 7);
        assert_eq!(contents(&backing), [3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(backing.read(3..6).unwrap(), [6, 7, 8]);

        let mut backing = make(&original);
        backing.replace_with_bytes(0..3, &[0x0a, 0x0b, 0x0c, 0x0d]);
        assert_eq!(backing.size(), 11);
        assert_eq!(
            contents(&backing),
            [0x0a, 0x0b, 0x0c, 0x0d, 3, 4, 5, 6, 7, 8, 9]
        );
        assert_eq!(backing.read(3..6).unwrap(), [0x0d, 3, 4]);

        let mut backing = make(&original);
        backing.replace_with_bytes(7..10, &[]);
        assert_eq!(contents(&backing), [0, 1, 2, 3, 4, 5, 6]);

        let mut backing = make(&original);
        backing.replace_with_bytes(3..6, &[]);
        assert_eq!(contents(&backing), [0, 1, 2, 6, 7, 8, 9]);
        assert_eq!(backing.read(2..6).unwrap(), [2, 6, 7, 8]);

        let mut backing = make(&original);
        backing.replace_with_bytes(3..3, &[0xa, 0xb, 0xc]);
        assert_eq!(backing.size(), 13);
        assert_eq!(
            contents(&backing),
            [0, 1, 2, 0xa, 0xb, 0xc, 3, 4, 5, 6, 7, 8, 9]
        );
        assert_eq!(backing.read(2..7).unwrap(), [2, 0xa, 0xb, 0xc, 3]);

        let mut backing = make(&original);
        backing.replace_with_bytes(3..6, &[0xa, 0xb, 0xc]);
        assert_eq!(contents(&backing), [0, 1, 2, 0xa, 0xb, 0xc, 6, 7, 8, 9]);
        assert!(backing.is_compact());
    }

    #[test]
    fn memory_mutations() {
        check_mutations(|bytes| Backing::from_bytes(bytes));
    }

    #[test]
    fn file_mutations() {
        let mut files = Vec::new();
        check_mutations(|bytes| {
            let (file, backing) = file_backing(bytes);
            files.push(file);
            backing
        });
    }

    #[test]
    fn composite_mutations() {
        let mut files = Vec::new();
        check_mutations(|bytes| {
            let (file, mut backing) = file_backing(&bytes[4..]);
            files.push(file);
            backing.replace_with_bytes(0..0, &bytes[..4]);
            assert!(matches!(backing, Backing::Composite(_)));
            backing
        });
    }

    #[test]
    fn memory_splice_stays_memory() {
        let mut backing = Backing::from_bytes(b"hello world".to_vec());
        backing.replace_with_bytes(0..5, b"howdy");
        assert!(matches!(backing, Backing::Memory(_)));
        assert_eq!(contents(&backing), b"howdy world");
    }

    #[test]
    fn file_splice_keeps_untouched_ranges_on_disk() {
        let (_file, mut backing) = file_backing(b"0123456789");
        backing.replace_with_bytes(4..6, b"xy");

        let children = backing.children();
        assert_eq!(children.len(), 3);
        assert!(matches!(&children[0], Backing::FileRange(b) if b.range() == (0..4)));
        assert!(matches!(&children[1], Backing::Memory(_)));
        assert!(matches!(&children[2], Backing::FileRange(b) if b.range() == (6..10)));
        assert_eq!(contents(&backing), b"0123xy6789");
    }

    #[test]
    fn adjacent_memory_is_merged() {
        let (_file, mut backing) = file_backing(b"0123456789");
        backing.replace_with_bytes(4..6, b"ab");
        backing.replace_with_bytes(6..6, b"cd");

        assert_eq!(backing.children().len(), 3);
        assert!(backing.is_compact());
        assert_eq!(contents(&backing), b"0123abcd6789");
    }

    #[test]
    fn deleting_everything_leaves_empty_memory() {
        let (_file, mut backing) = file_backing(b"0123456789");
        backing.replace_with_bytes(2..5, b"xyz");
        backing.replace_with_bytes(0..10, b"");

        assert!(matches!(&backing, Backing::Memory(m) if m.is_empty()));
    }

    #[test]
    fn single_piece_collapses() {
        let (_file, mut backing) = file_backing(b"0123456789");
        backing.replace_with_bytes(0..0, b"ab");
        backing.replace_with_bytes(0..2, b"");

        assert!(matches!(&backing, Backing::FileRange(b) if b.range() == (0..10)));
    }

    #[test]
    fn range_spanning_children_inserts_once() {
        let (_file, mut backing) = file_backing(b"0123456789");
        backing.replace_with_bytes(3..3, b"ab");
        backing.replace_with_bytes(8..8, b"cd");
        assert_eq!(contents(&backing), b"012ab345cd6789");

        backing.replace_with_bytes(1..13, b"XYZ");
        assert_eq!(contents(&backing), b"0XYZ9");
        assert!(backing.is_compact());
    }

    #[test]
    fn slice_of_composite_is_compact() {
        let (_file, mut backing) = file_backing(b"0123456789");
        backing.replace_with_bytes(5..5, b"abc");

        let slice = backing.slice(2..7);
        assert!(slice.is_compact());
        assert_eq!(contents(&slice), b"234ab");

        let inner = backing.slice(5..8);
        assert!(matches!(inner, Backing::Memory(_)));
        assert_eq!(contents(&inner), b"abc");
    }

    #[test]
    fn slices_share_descriptor_and_close_once() {
        let (_file, backing) = file_backing(b"0123456789");
        let mut edited = backing.clone();
        edited.replace_with_bytes(2..3, b"x");
        edited.replace_with_bytes(6..7, b"y");

        assert_eq!(edited.file_ranges().count(), 3);
        assert_eq!(edited.close(), 1);
        assert_eq!(edited.close(), 0);
        assert_eq!(backing.close(), 0);
        assert!(backing.read(0..1).is_err());
    }

    #[test]
    fn chunks_cover_content() {
        let (_file, mut backing) = file_backing(b"0123456789");
        backing.replace_with_bytes(3..4, b"---");

        let mut collected = Vec::new();
        let mut calls = 0;
        backing
            .try_for_each_chunk(2, &mut |chunk: &[u8]| {
                calls += 1;
                collected.extend_from_slice(chunk);
                Ok::<(), StorageError>(())
            })
            .unwrap();

        assert_eq!(collected, b"012---456789");
        assert!(calls > 3);
    }

    #[derive(Debug, Clone)]
    struct Edit {
        start: f64,
        len: f64,
        bytes: Vec<u8>,
    }

    fn edit_strategy() -> impl Strategy<Value = Edit> {
        (0.0..=1.0f64, 0.0..=1.0f64, prop::collection::vec(any::<u8>(), 0..8))
            .prop_map(|(start, len, bytes)| Edit { start, len, bytes })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn splices_match_vec_model(
            initial in prop::collection::vec(any::<u8>(), 0..64),
            edits in prop::collection::vec(edit_strategy(), 1..16),
        ) {
            let (_file, mut backing) = file_backing(&initial);
            let mut model = initial.clone();

            for edit in edits {
                let size = model.len();
                let start = (edit.start * size as f64) as usize;
                let end = start + ((edit.len * (size - start) as f64) as usize);
                let before = backing.size();

                backing.replace_with_bytes(start as u64..end as u64, &edit.bytes);
                model.splice(start..end, edit.bytes.iter().copied());

                prop_assert_eq!(
                    backing.size(),
                    before - (end - start) as u64 + edit.bytes.len() as u64
                );
                prop_assert!(backing.is_compact());
                prop_assert_eq!(contents(&backing), model.clone());
            }
        }
    }
}
