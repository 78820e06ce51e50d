//! # splicebuf Storage
//!
//! Leaf storage for splicebuf buffers.
//!
//! This crate provides the lowest-level byte stores a buffer can be built
//! from. Leaves are **opaque byte ranges** - they know how to report their
//! size, read bytes at an offset and narrow themselves to a sub-range, but
//! nothing about edits or persistence.
//!
//! ## Design Principles
//!
//! - Memory leaves own their bytes and are never aliased across slices
//! - File leaves are immutable views over a shared descriptor
//! - Slicing a file leaf performs no I/O
//! - A shared descriptor closes exactly once, however many leaves use it
//!
//! ## Available Leaves
//!
//! - [`MemoryBacking`] - A contiguous, owned byte store
//! - [`FileRangeBacking`] - A half-open byte range of a [`SharedDescriptor`]
//!
//! ## Example
//!
//! ```rust
//! use splicebuf_storage::{ByteSource, MemoryBacking};
//!
//! let backing = MemoryBacking::from(b"hello world".to_vec());
//! let data = backing.read_range(6..11).unwrap();
//! assert_eq!(&data, b"world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod descriptor;
mod error;
mod file;
mod memory;
mod source;

pub use descriptor::{DescriptorKind, FileId, SharedDescriptor, RESOURCE_FORK_ATTRIBUTE};
pub use error::{StorageError, StorageResult};
pub use file::FileRangeBacking;
pub use memory::MemoryBacking;
pub use source::ByteSource;
