//! # splicebuf Testkit
//!
//! Test utilities for splicebuf.
//!
//! This crate provides:
//! - Temporary file fixtures and sample buffers
//! - Property-based edit generators using proptest
//! - Tracing setup for tests
//!
//! The cross-crate integration tests live in this crate's `tests/`
//! directory.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use splicebuf_testkit::prelude::*;
//!
//! #[test]
//! fn edit_a_file() {
//!     with_file_buffer(b"0123456789", |buffer, path| {
//!         buffer.replace(2..4, b"xyz").unwrap();
//!         // ...
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
}

pub use fixtures::*;
pub use generators::*;

/// Installs a test-friendly `tracing` subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
