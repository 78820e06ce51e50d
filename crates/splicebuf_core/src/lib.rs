//! # splicebuf Core
//!
//! Editable byte buffers for tools that work on large files.
//!
//! This crate provides:
//! - [`Backing`], the memory / file-range / composite content model and its
//!   splice algorithm
//! - Quick Search pattern matching over paged content
//! - An in-place write planner that saves an edited buffer back into the
//!   file it reads from, staging only endangered ranges in a scratch file
//! - [`DataBuffer`], which owns a backing behind a lock, notifies observers
//!   and repoints itself at whatever it last wrote
//! - [`UndoHistory`], undo and redo over cheap snapshots
//!
//! ## Example
//!
//! ```no_run
//! use splicebuf_core::{DataBuffer, WriteOptions};
//!
//! let buffer = DataBuffer::open("firmware.bin").unwrap();
//! buffer.replace(0x40..0x44, &[0xde, 0xad, 0xbe, 0xef]).unwrap();
//!
//! // Only the four changed bytes are written.
//! buffer.write_to_path("firmware.bin", WriteOptions::new()).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backing;
mod buffer;
mod config;
mod error;
mod observers;
pub mod search;
mod stream;
mod undo;
pub mod write;

pub use backing::Backing;
pub use buffer::{DataBuffer, FileWriteOptions, WriteOptions};
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use observers::{ChangeCallback, ObserverId, WriteCallback};
pub use search::SearchOptions;
pub use stream::{Bytes, Chunks};
pub use undo::UndoHistory;

pub use splicebuf_storage::{DescriptorKind, FileId, StorageError};
