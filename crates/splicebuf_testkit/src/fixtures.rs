//! Test fixtures and buffer helpers.
//!
//! Provides temporary files with known contents and the sample buffers the
//! integration tests share.

use splicebuf_core::{Config, DataBuffer};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tempfile::{NamedTempFile, TempDir};
use tracing::trace;

/// The 15-byte buffer of NUL-separated words used by the search tests.
pub const SAMPLE: &[u8] = b"Foo\0Bar\0Bzr\0Baz";

/// Offset of the pattern planted by [`large_contents`].
pub const LARGE_PATTERN_OFFSET: u64 = 2_097_151;

/// Pattern planted by [`large_contents`].
pub const LARGE_PATTERN: &[u8] = b"needle";

/// Returns `len` bytes of repeating digits, so every offset is recognizable
/// in a failure message.
#[must_use]
pub fn digits(len: usize) -> Vec<u8> {
    (0..len).map(|i| b'0' + (i % 10) as u8).collect()
}

/// Returns contents a little over 2 MiB holding [`LARGE_PATTERN`] exactly
/// once, at [`LARGE_PATTERN_OFFSET`].
#[must_use]
pub fn large_contents() -> Vec<u8> {
    let len = 2 * 1024 * 1024 + 4096;
    let mut bytes: Vec<u8> = (0..len).map(|i| b'A' + (i % 26) as u8).collect();

    let offset = LARGE_PATTERN_OFFSET as usize;
    bytes[offset..offset + LARGE_PATTERN.len()].copy_from_slice(LARGE_PATTERN);
    bytes
}

/// A temporary file with known contents, deleted on drop.
pub struct TestFile {
    file: NamedTempFile,
}

impl TestFile {
    /// Creates a temporary file holding `contents`.
    pub fn new(contents: &[u8]) -> Self {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(contents).expect("Failed to write temp file");
        file.flush().expect("Failed to flush temp file");

        trace!(path = %file.path().display(), len = contents.len(), "created test file");
        Self { file }
    }

    /// Returns the file's path.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Reads the file's current contents from disk.
    pub fn contents(&self) -> Vec<u8> {
        fs::read(self.path()).expect("Failed to read temp file")
    }

    /// Opens a buffer over the file.
    pub fn buffer(&self) -> DataBuffer {
        DataBuffer::open(self.path()).expect("Failed to open buffer")
    }

    /// Opens a buffer over the file with a custom configuration.
    pub fn buffer_with_config(&self, config: Config) -> DataBuffer {
        self.buffer().with_config(config)
    }

    /// Opens the file for reading and writing.
    pub fn open_read_write(&self) -> File {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.path())
            .expect("Failed to reopen temp file")
    }
}

/// A scratch directory for tests that must observe what a write leaves
/// behind.
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Creates an empty scratch directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the directory's path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the number of entries in the directory.
    pub fn entry_count(&self) -> usize {
        fs::read_dir(self.path())
            .expect("Failed to list temp directory")
            .count()
    }

    /// Returns a config whose scratch files land in this directory.
    pub fn config(&self) -> Config {
        Config::default().scratch_dir(self.path())
    }
}

impl Default for ScratchDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a buffer opened over a temporary file holding
/// `contents`.
///
/// # Example
///
/// ```rust,ignore
/// use splicebuf_testkit::with_file_buffer;
///
/// #[test]
/// fn my_test() {
///     with_file_buffer(b"abc", |buffer, path| {
///         assert_eq!(buffer.size(), 3);
///     });
/// }
/// ```
pub fn with_file_buffer<F, R>(contents: &[u8], f: F) -> R
where
    F: FnOnce(&DataBuffer, &Path) -> R,
{
    let file = TestFile::new(contents);
    let buffer = file.buffer();
    f(&buffer, file.path())
}
