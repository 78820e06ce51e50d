//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read outside the bounds of a byte source.
    #[error("read out of bounds: offset {offset}, len {len}, size {size}")]
    OutOfBounds {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: u64,
        /// The size of the source.
        size: u64,
    },

    /// The underlying descriptor has been closed.
    #[error("descriptor is closed")]
    Closed,

    /// The file has no resource-fork attribute.
    #[error("resource fork attribute not present")]
    MissingAttribute,
}

impl StorageError {
    /// Returns the OS error code, if this error carries one.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }
}
