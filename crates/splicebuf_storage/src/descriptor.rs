//! Shared, closable file descriptors.

use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::fmt;
use std::fs::{File, Metadata};
use std::io;
use std::os::unix::fs::{FileExt, MetadataExt};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use xattr::FileExt as _;

/// Extended attribute that holds a file's resource fork.
#[cfg(target_os = "macos")]
pub const RESOURCE_FORK_ATTRIBUTE: &str = "com.apple.ResourceFork";

/// Extended attribute that holds a file's resource fork.
#[cfg(not(target_os = "macos"))]
pub const RESOURCE_FORK_ATTRIBUTE: &str = "user.com.apple.ResourceFork";

/// Which stream of a file a descriptor reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    /// The file's regular contents.
    File,
    /// The file's resource-fork extended attribute.
    ResourceFork,
}

/// Identity of a file on disk: device and inode numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    /// Device the file lives on.
    pub dev: u64,
    /// Inode number within the device.
    pub ino: u64,
}

impl FileId {
    /// Reads the identity of an open file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file's metadata cannot be read.
    pub fn of(file: &File) -> io::Result<Self> {
        Ok(Self::from_metadata(&file.metadata()?))
    }

    /// Extracts the identity from already fetched metadata.
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }
}

struct Inner {
    file: RwLock<Option<File>>,
    kind: DescriptorKind,
    id: FileId,
    size: u64,
    /// Attribute contents, read once at open.
    fork: Option<Vec<u8>>,
}

/// A reference-counted handle to an open file or resource fork.
///
/// Every [`FileRangeBacking`](crate::FileRangeBacking) produced by slicing
/// shares the same handle. The handle carries a single closed state: the
/// first call to [`close`](Self::close) releases the OS descriptor and every
/// later call, from any sibling, is a no-op.
///
/// # Thread Safety
///
/// Reads take a shared lock on the descriptor; closing takes an exclusive
/// lock, so a close never races an in-flight positioned read.
#[derive(Clone)]
pub struct SharedDescriptor {
    inner: Arc<Inner>,
}

impl SharedDescriptor {
    /// Opens the file at `path` read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or, for resource forks,
    /// if the attribute cannot be read. The file is closed before the error
    /// is returned.
    pub fn open(path: &Path, kind: DescriptorKind) -> StorageResult<Self> {
        let file = File::open(path)?;
        debug!(path = %path.display(), ?kind, "opened descriptor");
        Self::from_file(file, kind)
    }

    /// Wraps an already open file.
    ///
    /// The size of the file (or of its resource-fork attribute) is read
    /// once here and never again.
    ///
    /// # Errors
    ///
    /// Returns an error if the file's metadata or resource fork cannot be
    /// read. `file` is dropped, and therefore closed, on failure.
    pub fn from_file(file: File, kind: DescriptorKind) -> StorageResult<Self> {
        let id = FileId::of(&file)?;

        let (size, fork) = match kind {
            DescriptorKind::File => (file.metadata()?.len(), None),
            DescriptorKind::ResourceFork => {
                let data = file
                    .get_xattr(RESOURCE_FORK_ATTRIBUTE)?
                    .ok_or(StorageError::MissingAttribute)?;
                (data.len() as u64, Some(data))
            }
        };

        Ok(Self::new(file, kind, id, size, fork))
    }

    /// Wraps a file whose contents were just written, without reading its metadata again.
    ///
    /// `id` and `size` must describe `file`; reads are clamped to `size`.
    #[must_use]
    pub fn from_written_file(file: File, id: FileId, size: u64) -> Self {
        Self::new(file, DescriptorKind::File, id, size, None)
    }

    /// Wraps a file whose resource fork was just set to `data`, without
    /// reading the attribute back.
    #[must_use]
    pub fn from_written_fork(file: File, id: FileId, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self::new(file, DescriptorKind::ResourceFork, id, size, Some(data))
    }

    fn new(
        file: File,
        kind: DescriptorKind,
        id: FileId,
        size: u64,
        fork: Option<Vec<u8>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                file: RwLock::new(Some(file)),
                kind,
                id,
                size,
                fork,
            }),
        }
    }

    /// Returns which stream this descriptor reads.
    #[must_use]
    pub fn kind(&self) -> DescriptorKind {
        self.inner.kind
    }

    /// Returns the identity of the underlying file.
    #[must_use]
    pub fn file_id(&self) -> FileId {
        self.inner.id
    }

    /// Returns the size measured when the descriptor was opened, or recorded
    /// when it was written.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.size
    }

    /// Returns `true` once the descriptor has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.file.read().is_none()
    }

    /// Returns `true` if both handles refer to the same open descriptor.
    #[must_use]
    pub fn ptr_eq(&self, other: &SharedDescriptor) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns `true` if this descriptor reads the regular contents of the
    /// file identified by `id`.
    #[must_use]
    pub fn is_contents_of(&self, id: FileId) -> bool {
        self.inner.kind == DescriptorKind::File && self.inner.id == id
    }

    /// Closes the descriptor.
    ///
    /// Returns `true` if this call released the OS handle, `false` if it had
    /// already been closed.
    pub fn close(&self) -> bool {
        let file = self.inner.file.write().take();

        match file {
            Some(file) => {
                drop(file);
                debug!(id = ?self.inner.id, kind = ?self.inner.kind, "closed descriptor");
                true
            }
            None => false,
        }
    }

    /// Reads bytes at an absolute offset within the file or attribute.
    ///
    /// Partial reads are accumulated until `buf` is full or the data is
    /// exhausted. The count is clamped to the bytes remaining before the
    /// measured size.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] after [`close`](Self::close), or an
    /// I/O error from the positioned read.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        let guard = self.inner.file.read();
        let file = guard.as_ref().ok_or(StorageError::Closed)?;

        let remaining = self.inner.size.saturating_sub(offset);
        let wanted = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));

        if wanted == 0 {
            return Ok(0);
        }

        if let Some(fork) = &self.inner.fork {
            // Bounded by the measured size, so the offset fits in usize.
            let start = offset as usize;
            buf[..wanted].copy_from_slice(&fork[start..start + wanted]);
            return Ok(wanted);
        }

        let mut total = 0;
        while total < wanted {
            match file.read_at(&mut buf[total..wanted], offset + total as u64) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }

        Ok(total)
    }
}

impl fmt::Debug for SharedDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedDescriptor")
            .field("kind", &self.inner.kind)
            .field("id", &self.inner.id)
            .field("size", &self.inner.size)
            .field("closed", &self.is_closed())
            .finish()
    }
}
