//! Buffer configuration.

use std::path::PathBuf;

/// Configuration for a [`DataBuffer`](crate::DataBuffer).
#[derive(Debug, Clone)]
pub struct Config {
    /// Size of each window read by the search engine.
    pub search_window: usize,

    /// Size of each chunk pulled by byte streaming.
    pub stream_chunk_size: usize,

    /// Buffer size used when copying file ranges during writes.
    pub copy_chunk_size: usize,

    /// Largest file-backed undo snapshot converted into memory by
    /// [`UndoHistory::materialize`](crate::UndoHistory::materialize).
    pub undo_materialize_limit: u64,

    /// Directory for scratch files. `None` uses the system temp directory.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_window: 1024 * 1024,                // 1 MiB
            stream_chunk_size: 16 * 1024,              // 16 KiB
            copy_chunk_size: 1024 * 1024,              // 1 MiB
            undo_materialize_limit: 100 * 1024 * 1024, // 100 MiB
            scratch_dir: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the search window size.
    #[must_use]
    pub const fn search_window(mut self, size: usize) -> Self {
        self.search_window = size;
        self
    }

    /// Sets the streaming chunk size.
    #[must_use]
    pub const fn stream_chunk_size(mut self, size: usize) -> Self {
        self.stream_chunk_size = size;
        self
    }

    /// Sets the copy buffer size used while writing.
    #[must_use]
    pub const fn copy_chunk_size(mut self, size: usize) -> Self {
        self.copy_chunk_size = size;
        self
    }

    /// Sets the largest undo snapshot that is converted into memory.
    #[must_use]
    pub const fn undo_materialize_limit(mut self, limit: u64) -> Self {
        self.undo_materialize_limit = limit;
        self
    }

    /// Sets the directory scratch files are created in.
    #[must_use]
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }
}
