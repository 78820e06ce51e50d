//! Error types for splicebuf core.

use splicebuf_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in buffer operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage error while reading a leaf.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error while writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A range or index lies outside the buffer.
    #[error("range {start}..{end} out of bounds for buffer of size {size}")]
    OutOfBounds {
        /// Start of the offending range.
        start: u64,
        /// End of the offending range.
        end: u64,
        /// Size of the buffer.
        size: u64,
    },

    /// The temporary file of an atomic write could not be renamed over the
    /// destination.
    #[error("failed to replace destination: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl CoreError {
    /// Creates an out-of-bounds error.
    pub(crate) fn out_of_bounds(start: u64, end: u64, size: u64) -> Self {
        Self::OutOfBounds { start, end, size }
    }

    /// Returns `true` if the error was caused by a closed descriptor.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Closed))
    }

    /// Returns the OS error code, if this error carries one.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Storage(err) => err.raw_os_error(),
            Self::Io(err) => err.raw_os_error(),
            Self::Persist(err) => err.error.raw_os_error(),
            Self::OutOfBounds { .. } => None,
        }
    }
}
