//! The top-level buffer.

use crate::backing::Backing;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::observers::{ObserverId, Observers};
use crate::search::{self, SearchOptions};
use crate::stream::{Bytes, Chunks};
use crate::write;
use parking_lot::Mutex;
use splicebuf_storage::{
    DescriptorKind, FileId, FileRangeBacking, SharedDescriptor, RESOURCE_FORK_ATTRIBUTE,
};
use std::fmt;
use std::fs::{self, File, OpenOptions, Permissions};
use std::ops::Range;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};
use xattr::FileExt as _;

/// Options for [`DataBuffer::write_to_path`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Write into the resource fork instead of the file contents.
    pub resource_fork: bool,
    /// Write a temporary sibling and rename it over the destination.
    pub atomically: bool,
}

impl WriteOptions {
    /// Creates options for a plain, non-atomic write.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the resource fork is written.
    #[must_use]
    pub const fn resource_fork(mut self, value: bool) -> Self {
        self.resource_fork = value;
        self
    }

    /// Sets whether the write goes through a temporary file.
    #[must_use]
    pub const fn atomically(mut self, value: bool) -> Self {
        self.atomically = value;
        self
    }
}

/// Options for [`DataBuffer::write_to_file`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileWriteOptions {
    /// Write into the resource fork instead of the file contents.
    pub resource_fork: bool,
    /// Cut the file off after the written content.
    pub truncate: bool,
    /// Close the buffer's copy of the descriptor when it is discarded.
    pub close_on_discard: bool,
}

impl FileWriteOptions {
    /// Creates options for a plain write that keeps trailing bytes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the resource fork is written.
    #[must_use]
    pub const fn resource_fork(mut self, value: bool) -> Self {
        self.resource_fork = value;
        self
    }

    /// Sets whether the file is truncated after the written content.
    #[must_use]
    pub const fn truncate(mut self, value: bool) -> Self {
        self.truncate = value;
        self
    }

    /// Sets whether the buffer closes its descriptor when discarded.
    #[must_use]
    pub const fn close_on_discard(mut self, value: bool) -> Self {
        self.close_on_discard = value;
        self
    }
}

struct BufferState {
    backing: Backing,
    /// The descriptor this buffer opened, adopted, or last wrote to.
    descriptor: Option<SharedDescriptor>,
    close_on_discard: bool,
}

impl BufferState {
    fn check(&self, range: &Range<u64>) -> CoreResult<()> {
        let size = self.backing.size();
        if range.start > range.end || range.end > size {
            return Err(CoreError::out_of_bounds(range.start, range.end, size));
        }
        Ok(())
    }
}

/// A mutable byte buffer backed by memory, a file, or a resource fork.
///
/// Edits are recorded structurally: replacing a range of a file-backed
/// buffer reads nothing from disk, and the untouched parts of the file stay
/// on disk until the buffer is written.
///
/// # Thread Safety
///
/// All state sits behind a single lock; every operation holds it for its
/// whole duration, so operations on one buffer are serialized. Observers
/// run after the lock is released.
///
/// # Example
///
/// ```rust
/// use splicebuf_core::{DataBuffer, SearchOptions};
///
/// let buffer = DataBuffer::from_bytes(b"Foo\0Bar\0Baz".to_vec());
/// buffer.replace(4..7, b"Quux").unwrap();
///
/// assert_eq!(buffer.c_string_at(4).unwrap(), b"Quux");
/// assert_eq!(
///     buffer.search(b"baz", SearchOptions::new().case_insensitive(true), None).unwrap(),
///     Some(9..12)
/// );
/// ```
pub struct DataBuffer {
    state: Mutex<BufferState>,
    observers: Observers,
    config: Config,
}

impl DataBuffer {
    fn with_state(backing: Backing, close_on_discard: bool) -> Self {
        let descriptor = backing.first_file_range().map(|range| range.descriptor().clone());

        Self {
            state: Mutex::new(BufferState {
                backing,
                descriptor,
                close_on_discard,
            }),
            observers: Observers::default(),
            config: Config::default(),
        }
    }

    /// Creates a memory-backed buffer.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_state(Backing::from_bytes(bytes), false)
    }

    /// Opens the file at `path` read-only. The descriptor is closed when the
    /// buffer is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or inspected.
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        Ok(Self::with_state(
            Backing::open(path.as_ref(), DescriptorKind::File)?,
            true,
        ))
    }

    /// Opens the resource fork of the file at `path`. The descriptor is
    /// closed when the buffer is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or has no resource
    /// fork.
    pub fn open_resource_fork(path: impl AsRef<Path>) -> CoreResult<Self> {
        Ok(Self::with_state(
            Backing::open(path.as_ref(), DescriptorKind::ResourceFork)?,
            true,
        ))
    }

    /// Adopts an open file.
    ///
    /// With `close_on_discard` the descriptor is closed when the buffer is
    /// dropped. Otherwise it stays open until the buffer and every snapshot
    /// taken from it are gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its resource fork cannot be inspected.
    pub fn from_file(file: File, kind: DescriptorKind, close_on_discard: bool) -> CoreResult<Self> {
        Ok(Self::with_state(
            Backing::from_file(file, kind)?,
            close_on_discard,
        ))
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the number of bytes in the buffer.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.state.lock().backing.size()
    }

    /// Returns `true` if the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns a copy of the current backing.
    #[must_use]
    pub fn backing(&self) -> Backing {
        self.state.lock().backing.clone()
    }

    /// Returns the byte at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of bounds or the read fails.
    pub fn byte_at(&self, index: u64) -> CoreResult<u8> {
        let bytes = self.read(index..index.saturating_add(1))?;
        bytes
            .first()
            .copied()
            .ok_or_else(|| CoreError::out_of_bounds(index, index, self.size()))
    }

    /// Reads the bytes in `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if `range` is out of bounds or the read fails.
    pub fn read(&self, range: Range<u64>) -> CoreResult<Vec<u8>> {
        let state = self.state.lock();
        state.check(&range)?;
        Ok(state.backing.read(range)?)
    }

    /// Reads the whole buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if a file read fails.
    pub fn to_vec(&self) -> CoreResult<Vec<u8>> {
        let state = self.state.lock();
        Ok(state.backing.read(0..state.backing.size())?)
    }

    /// Reads from `index` up to, not including, the next NUL byte or the
    /// end of the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is past the end or a read fails.
    pub fn c_string_at(&self, index: u64) -> CoreResult<Vec<u8>> {
        let state = self.state.lock();
        let size = state.backing.size();
        state.check(&(index..size))?;

        let end = search::find(
            &state.backing,
            &[0],
            SearchOptions::new(),
            index..size,
            self.config.search_window,
        )?
        .map_or(size, |found| found.start);

        Ok(state.backing.read(index..end)?)
    }

    /// Searches for `pattern` within `range`, or the whole buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if `range` is out of bounds or a read fails.
    pub fn search(
        &self,
        pattern: &[u8],
        options: SearchOptions,
        range: Option<Range<u64>>,
    ) -> CoreResult<Option<Range<u64>>> {
        let state = self.state.lock();
        let range = range.unwrap_or(0..state.backing.size());
        state.check(&range)?;

        Ok(search::find(
            &state.backing,
            pattern,
            options,
            range,
            self.config.search_window,
        )?)
    }

    /// Returns the content of `range` as a standalone backing, without
    /// reading file bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `range` is out of bounds.
    pub fn snapshot(&self, range: Range<u64>) -> CoreResult<Backing> {
        let state = self.state.lock();
        state.check(&range)?;
        Ok(state.backing.slice(range))
    }

    /// Replaces the bytes in `range` with `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if `range` is out of bounds.
    pub fn replace(&self, range: Range<u64>, bytes: &[u8]) -> CoreResult<()> {
        self.replace_with_backing(range, Backing::from_bytes(bytes))
    }

    /// Replaces the bytes in `range` with the content of `new`, typically a
    /// snapshot of this or another buffer.
    ///
    /// Will-change observers see `range`; did-change observers see the range
    /// the new content occupies.
    ///
    /// # Errors
    ///
    /// Returns an error if `range` is out of bounds.
    pub fn replace_with_backing(&self, range: Range<u64>, new: Backing) -> CoreResult<()> {
        self.state.lock().check(&range)?;
        let new_len = new.size();

        self.observers.will_change(self, range.clone());
        {
            let mut state = self.state.lock();
            state.check(&range)?;
            state.backing.replace_range(range.clone(), new);
        }
        self.observers
            .did_change(self, range.start..range.start + new_len);

        Ok(())
    }

    /// Iterates over the bytes in `range`, reading one chunk at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if `range` is out of bounds.
    pub fn bytes(&self, range: Range<u64>) -> CoreResult<Bytes<'_>> {
        Ok(Bytes::new(self.chunks(range)?))
    }

    /// Iterates over `range` in chunks of the configured stream size. The
    /// lock is taken only while each chunk is read.
    ///
    /// # Errors
    ///
    /// Returns an error if `range` is out of bounds.
    pub fn chunks(&self, range: Range<u64>) -> CoreResult<Chunks<'_>> {
        self.state.lock().check(&range)?;
        Ok(Chunks::new(self, range, self.config.stream_chunk_size))
    }

    /// Writes the buffer to `path` and repoints it at the result.
    ///
    /// A non-atomic write opens (or creates) the file and truncates it to
    /// the buffer's size. If the buffer reads from that same file, only the
    /// changed parts are written. An atomic write fills a temporary file
    /// next to `path` and renames it over the destination; for a resource
    /// fork the temporary file starts as a copy of the destination.
    ///
    /// On success the buffer reads from the written file and closes it when
    /// discarded. On failure the buffer is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if opening, writing or renaming fails.
    pub fn write_to_path(&self, path: impl AsRef<Path>, options: WriteOptions) -> CoreResult<()> {
        let path = path.as_ref();

        {
            let mut state = self.state.lock();

            let (descriptor, written) = if options.atomically {
                self.write_atomically(&state.backing, path, options.resource_fork)?
            } else {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .mode(0o644)
                    .open(path)?;

                Target::inspect(file)?.write(&state.backing, options.resource_fork, true, &self.config)?
            };

            debug!(path = %path.display(), kind = ?descriptor.kind(), "repointing buffer at written file");
            Self::repoint(&mut state, descriptor, written, true);
        }

        self.observers.did_write(self, Some(path));
        Ok(())
    }

    fn write_atomically(
        &self,
        backing: &Backing,
        path: &Path,
        resource_fork: bool,
    ) -> CoreResult<(SharedDescriptor, Range<u64>)> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let temp = tempfile::Builder::new()
            .prefix(".splicebuf-")
            .tempfile_in(dir)?;

        if resource_fork {
            fs::copy(path, temp.path())?;
            if let Err(err) = temp.as_file().remove_xattr(RESOURCE_FORK_ATTRIBUTE) {
                trace!(%err, "copied destination has no resource fork");
            }
        } else {
            let permissions = match fs::metadata(path) {
                Ok(metadata) => metadata.permissions(),
                Err(_) => Permissions::from_mode(0o644),
            };
            temp.as_file().set_permissions(permissions)?;
        }

        let target = Target::inspect(temp.as_file().try_clone()?)?;
        let written = target.write(backing, resource_fork, true, &self.config)?;

        temp.persist(path)?;
        debug!(path = %path.display(), "replaced destination atomically");

        Ok(written)
    }

    /// Writes the buffer to an open file and repoints it at the result.
    ///
    /// Writing starts at the file's current position. If the buffer reads
    /// from the same file, only the changed parts are written; `file` may be
    /// write-only, but the repointed buffer then fails to read. The buffer
    /// keeps its own duplicate of the descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if duplicating the descriptor or writing fails. The
    /// buffer is left unchanged on failure.
    pub fn write_to_file(&self, file: &File, options: FileWriteOptions) -> CoreResult<()> {
        let target = Target::inspect(file.try_clone()?)?;

        {
            let mut state = self.state.lock();
            let (descriptor, written) = target.write(
                &state.backing,
                options.resource_fork,
                options.truncate,
                &self.config,
            )?;

            debug!(kind = ?descriptor.kind(), "repointing buffer at written descriptor");
            Self::repoint(&mut state, descriptor, written, options.close_on_discard);
        }

        self.observers.did_write(self, None);
        Ok(())
    }

    fn repoint(
        state: &mut BufferState,
        descriptor: SharedDescriptor,
        written: Range<u64>,
        close_on_discard: bool,
    ) {
        let backing = Backing::FileRange(FileRangeBacking::whole(descriptor.clone()).slice(written));
        let previous = std::mem::replace(&mut state.descriptor, Some(descriptor));

        state.backing = Backing::compacted(vec![backing]);
        if state.close_on_discard {
            if let Some(previous) = previous {
                previous.close();
            }
        }
        state.close_on_discard = close_on_discard;
    }

    /// Closes the descriptor the buffer opened, adopted, or last wrote to.
    ///
    /// Every leaf sharing that descriptor, including snapshots, fails to
    /// read afterwards. Returns `true` if this call released it; closing
    /// again is a no-op.
    pub fn close(&self) -> bool {
        self.state
            .lock()
            .descriptor
            .as_ref()
            .is_some_and(SharedDescriptor::close)
    }

    /// Registers a callback run before each mutation with the range about
    /// to be replaced.
    pub fn on_will_change<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&DataBuffer, Range<u64>) + Send + Sync + 'static,
    {
        self.observers.add_will_change(Arc::new(callback))
    }

    /// Registers a callback run after each mutation with the range the new
    /// content occupies.
    pub fn on_did_change<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&DataBuffer, Range<u64>) + Send + Sync + 'static,
    {
        self.observers.add_did_change(Arc::new(callback))
    }

    /// Registers a callback run after each successful write with the
    /// destination path, or `None` for descriptor writes.
    pub fn on_did_write<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&DataBuffer, Option<&Path>) + Send + Sync + 'static,
    {
        self.observers.add_did_write(Arc::new(callback))
    }

    /// Unregisters an observer. Returns `false` if it was not registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }
}

/// A write destination, inspected before anything is written so that
/// repointing at it afterwards needs no further I/O.
struct Target {
    file: File,
    id: FileId,
    len: u64,
}

impl Target {
    fn inspect(file: File) -> CoreResult<Self> {
        let metadata = file.metadata()?;
        Ok(Self {
            id: FileId::from_metadata(&metadata),
            len: metadata.len(),
            file,
        })
    }

    /// Writes `backing` through the inspected file and returns the descriptor
    /// to repoint at, with the written range.
    fn write(
        self,
        backing: &Backing,
        resource_fork: bool,
        truncate: bool,
        config: &Config,
    ) -> CoreResult<(SharedDescriptor, Range<u64>)> {
        if resource_fork {
            let data = write::rewrite_resource_fork(backing, &self.file, config)?;
            let written = 0..data.len() as u64;
            return Ok((
                SharedDescriptor::from_written_fork(self.file, self.id, data),
                written,
            ));
        }

        let written = write::write_to_file(backing, &self.file, false, truncate, config)?;
        let size = if truncate {
            written.end
        } else {
            written.end.max(self.len)
        };

        Ok((
            SharedDescriptor::from_written_file(self.file, self.id, size),
            written,
        ))
    }
}

impl fmt::Debug for DataBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DataBuffer")
            .field("size", &state.backing.size())
            .field("descriptor", &state.descriptor)
            .field("close_on_discard", &state.close_on_discard)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

impl Drop for DataBuffer {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.close_on_discard {
            if let Some(descriptor) = &state.descriptor {
                descriptor.close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, NamedTempFile};

    const SAMPLE: &[u8] = b"Foo\0Bar\0Bzr\0Baz";

    fn temp_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_and_bounds() {
        let buffer = DataBuffer::from_bytes(SAMPLE.to_vec());

        assert_eq!(buffer.size(), 15);
        assert_eq!(buffer.byte_at(4).unwrap(), b'B');
        assert_eq!(buffer.read(4..7).unwrap(), b"Bar");
        assert!(matches!(
            buffer.read(10..16),
            Err(CoreError::OutOfBounds { start: 10, end: 16, size: 15 })
        ));
        assert!(buffer.byte_at(15).is_err());
    }

    #[test]
    fn c_strings() {
        let buffer = DataBuffer::from_bytes(SAMPLE.to_vec());

        assert_eq!(buffer.c_string_at(0).unwrap(), b"Foo");
        assert_eq!(buffer.c_string_at(5).unwrap(), b"ar");
        assert_eq!(buffer.c_string_at(3).unwrap(), b"");
        assert_eq!(buffer.c_string_at(12).unwrap(), b"Baz");
        assert_eq!(buffer.c_string_at(15).unwrap(), b"");
        assert!(buffer.c_string_at(16).is_err());
    }

    #[test]
    fn search_sample() {
        let buffer = DataBuffer::from_bytes(SAMPLE.to_vec());
        let options = SearchOptions::new();

        assert_eq!(buffer.search(b"Bar", options, None).unwrap(), Some(4..7));
        assert_eq!(
            buffer.search(b"bar", options.case_insensitive(true), None).unwrap(),
            Some(4..7)
        );
        assert_eq!(
            buffer.search(b"Ba", options.backwards(true), None).unwrap(),
            Some(12..14)
        );
        assert_eq!(
            buffer.search(b"Foo", options.anchored(true), None).unwrap(),
            Some(0..3)
        );
        assert_eq!(buffer.search(b"ooo", options, None).unwrap(), None);
        assert_eq!(buffer.search(b"", options, None).unwrap(), None);
        assert_eq!(buffer.search(b"Ba", options, Some(5..15)).unwrap(), Some(12..14));
        assert!(buffer.search(b"Ba", options, Some(5..16)).is_err());
    }

    #[test]
    fn replace_notifies_observers() {
        let buffer = DataBuffer::from_bytes(SAMPLE.to_vec());
        let events = Arc::new(Mutex::new(Vec::new()));

        let will = Arc::clone(&events);
        buffer.on_will_change(move |buffer, range| {
            // Observers run outside the lock and may read the buffer.
            will.lock().push(("will", range, buffer.size()));
        });
        let did = Arc::clone(&events);
        let id = buffer.on_did_change(move |buffer, range| {
            did.lock().push(("did", range, buffer.size()));
        });

        buffer.replace(4..7, b"Quux").unwrap();
        assert_eq!(
            *events.lock(),
            vec![("will", 4..7, 15), ("did", 4..8, 16)]
        );

        assert!(buffer.remove_observer(id));
        buffer.replace(0..0, b"").unwrap();
        assert_eq!(events.lock().len(), 3);
        assert_eq!(buffer.to_vec().unwrap(), b"Foo\0Quux\0Bzr\0Baz");
    }

    #[test]
    fn out_of_bounds_replace_changes_nothing() {
        let buffer = DataBuffer::from_bytes(SAMPLE.to_vec());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        buffer.on_will_change(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(buffer.replace(14..20, b"x").is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(buffer.to_vec().unwrap(), SAMPLE);
    }

    #[test]
    fn file_buffer_edits_in_memory_until_written() {
        let file = temp_file(SAMPLE);
        let buffer = DataBuffer::open(file.path()).unwrap();

        buffer.replace(0..3, b"Qux").unwrap();
        assert_eq!(buffer.read(0..7).unwrap(), b"Qux\0Bar");
        assert_eq!(std::fs::read(file.path()).unwrap(), SAMPLE);
    }

    #[test]
    fn write_to_same_path_in_place() {
        let file = temp_file(SAMPLE);
        let buffer = DataBuffer::open(file.path()).unwrap();
        let paths = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&paths);
        buffer.on_did_write(move |_, path| seen.lock().push(path.map(Path::to_path_buf)));

        buffer.replace(4..8, b"").unwrap();
        buffer.replace(0..0, b">>").unwrap();
        let expected = buffer.to_vec().unwrap();

        buffer.write_to_path(file.path(), WriteOptions::new()).unwrap();

        assert_eq!(std::fs::read(file.path()).unwrap(), expected);
        assert_eq!(buffer.to_vec().unwrap(), expected);
        assert!(matches!(buffer.backing(), Backing::FileRange(_)));
        assert_eq!(*paths.lock(), vec![Some(file.path().to_path_buf())]);
    }

    #[test]
    fn write_to_new_path_repoints() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first.bin");
        let second = dir.path().join("second.bin");

        let buffer = DataBuffer::from_bytes(b"hello".to_vec());
        buffer.write_to_path(&first, WriteOptions::new()).unwrap();
        assert_eq!(std::fs::read(&first).unwrap(), b"hello");

        buffer.replace(5..5, b" world").unwrap();
        buffer.write_to_path(&second, WriteOptions::new()).unwrap();

        assert_eq!(std::fs::read(&first).unwrap(), b"hello");
        assert_eq!(std::fs::read(&second).unwrap(), b"hello world");

        // Later edits write in place into the new file.
        buffer.replace(0..1, b"J").unwrap();
        buffer.write_to_path(&second, WriteOptions::new()).unwrap();
        assert_eq!(std::fs::read(&second).unwrap(), b"Jello world");
    }

    #[test]
    fn atomic_write_replaces_destination() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"previous, longer contents").unwrap();

        let buffer = DataBuffer::open(&path).unwrap();
        buffer.replace(0..10, b"new").unwrap();
        let expected = buffer.to_vec().unwrap();

        buffer
            .write_to_path(&path, WriteOptions::new().atomically(true))
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), expected);
        assert_eq!(buffer.to_vec().unwrap(), expected);
        // Only the destination remains in the directory.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn failed_write_leaves_buffer_unchanged() {
        let dir = tempdir().unwrap();
        let file = temp_file(SAMPLE);
        let buffer = DataBuffer::open(file.path()).unwrap();
        let writes = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&writes);
        buffer.on_did_write(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let missing = dir.path().join("missing").join("out.bin");
        assert!(buffer.write_to_path(&missing, WriteOptions::new()).is_err());
        assert!(buffer
            .write_to_path(&missing, WriteOptions::new().atomically(true))
            .is_err());

        assert_eq!(writes.load(Ordering::SeqCst), 0);
        assert_eq!(buffer.to_vec().unwrap(), SAMPLE);
    }

    #[test]
    fn write_to_descriptor_from_position() {
        let file = temp_file(b"HEADER--");
        let buffer = DataBuffer::from_bytes(b"payload".to_vec());

        let mut handle = OpenOptions::new()
            .read(true)
            .write(true)
            .open(file.path())
            .unwrap();
        handle.seek(SeekFrom::Start(6)).unwrap();

        buffer
            .write_to_file(&handle, FileWriteOptions::new().truncate(true))
            .unwrap();

        assert_eq!(std::fs::read(file.path()).unwrap(), b"HEADERpayload");
        assert_eq!(buffer.to_vec().unwrap(), b"payload");

        // The descriptor outlives the caller's handle.
        drop(handle);
        assert_eq!(buffer.read(0..3).unwrap(), b"pay");
    }

    #[test]
    fn write_without_truncate_keeps_tail() {
        let file = temp_file(b"0123456789");
        let buffer = DataBuffer::from_bytes(b"abc".to_vec());
        let handle = OpenOptions::new().write(true).open(file.path()).unwrap();

        buffer.write_to_file(&handle, FileWriteOptions::new()).unwrap();

        assert_eq!(std::fs::read(file.path()).unwrap(), b"abc3456789");
        assert_eq!(buffer.size(), 3);
    }

    #[test]
    fn write_only_handle_to_own_file() {
        let file = temp_file(b"0123456789abcdefghij");
        let buffer = DataBuffer::open(file.path()).unwrap();
        buffer.replace(0..10, b"ABCDE").unwrap();

        let handle = OpenOptions::new().write(true).open(file.path()).unwrap();
        buffer
            .write_to_file(&handle, FileWriteOptions::new().truncate(true))
            .unwrap();

        assert_eq!(std::fs::read(file.path()).unwrap(), b"ABCDEabcdefghij");
        assert_eq!(buffer.size(), 15);
        // Repointed at the write-only duplicate.
        assert!(buffer.read(0..1).is_err());
    }

    #[test]
    fn repointed_descriptor_covers_written_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let buffer = DataBuffer::from_bytes(b"hello".to_vec());
        buffer.write_to_path(&path, WriteOptions::new()).unwrap();
        let written = buffer.backing();
        let range = written.first_file_range().unwrap();
        assert_eq!(range.descriptor().size(), 5);

        buffer.replace(5..5, b" world").unwrap();
        buffer
            .write_to_path(&path, WriteOptions::new().atomically(true))
            .unwrap();
        let written = buffer.backing();
        let range = written.first_file_range().unwrap();
        assert_eq!(range.descriptor().size(), 11);
        assert_eq!(buffer.read(0..11).unwrap(), b"hello world");

        // Without truncation the old tail stays readable through the descriptor.
        let file = temp_file(b"0123456789abcdef");
        let handle = OpenOptions::new().read(true).write(true).open(file.path()).unwrap();
        buffer.write_to_file(&handle, FileWriteOptions::new()).unwrap();
        let written = buffer.backing();
        let range = written.first_file_range().unwrap();
        assert_eq!(range.descriptor().size(), 16);
        assert_eq!(buffer.to_vec().unwrap(), b"hello world");
    }

    #[test]
    fn close_is_idempotent_and_shared_with_snapshots() {
        let file = temp_file(SAMPLE);
        let buffer = DataBuffer::open(file.path()).unwrap();
        let snapshot = buffer.snapshot(4..7).unwrap();
        buffer.replace(0..3, b"x").unwrap();

        assert!(buffer.close());
        assert!(!buffer.close());

        assert!(buffer.read(4..6).unwrap_err().is_closed());
        assert!(snapshot.read(0..3).is_err());
        // Memory parts are still readable.
        assert_eq!(buffer.read(0..1).unwrap(), b"x");
    }

    #[test]
    fn drop_closes_only_when_requested() {
        let file = temp_file(SAMPLE);

        let owned = DataBuffer::open(file.path()).unwrap();
        let snapshot = owned.snapshot(0..3).unwrap();
        drop(owned);
        assert!(snapshot.read(0..3).is_err());

        let adopted = DataBuffer::from_file(
            File::open(file.path()).unwrap(),
            DescriptorKind::File,
            false,
        )
        .unwrap();
        let snapshot = adopted.snapshot(0..3).unwrap();
        drop(adopted);
        assert_eq!(snapshot.read(0..3).unwrap(), b"Foo");
    }
}
