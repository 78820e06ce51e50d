//! Writing a backing out to a file or resource fork.
//!
//! [`write_to_file`] picks the strategy: resource forks are always replaced
//! whole, a file that the backing itself reads from is rewritten in place
//! via a [`WritePlan`], and anything else gets a streamed full rewrite.

mod execute;
mod plan;

pub use execute::write_in_place;
pub use plan::{plan_in_place, PlanItem, WritePlan};

use crate::backing::Backing;
use crate::config::Config;
use crate::error::CoreResult;
use splicebuf_storage::{FileId, RESOURCE_FORK_ATTRIBUTE};
use std::fs::File;
use std::io::{Seek, Write};
use std::ops::Range;
use tracing::{debug, trace};
use xattr::FileExt as _;

/// Writes `backing` to `file`, choosing in place or full rewrite.
///
/// For the data fork, writing starts at the file's current position and
/// the written offsets are returned. For the resource fork, the attribute is
/// replaced and `0..size` is returned.
///
/// # Errors
///
/// Returns an error if reading the backing or writing the file fails.
pub fn write_to_file(
    backing: &Backing,
    file: &File,
    resource_fork: bool,
    truncate: bool,
    config: &Config,
) -> CoreResult<Range<u64>> {
    if resource_fork {
        let data = rewrite_resource_fork(backing, file, config)?;
        return Ok(0..data.len() as u64);
    }

    if backing.references_file(FileId::of(file)?) {
        debug!(size = backing.size(), "writing in place");
        write_in_place(backing, file, truncate, config)
    } else {
        debug!(size = backing.size(), "rewriting file");
        rewrite(backing, file, truncate, config)
    }
}

/// Streams the whole backing to `file` from its current position.
///
/// # Errors
///
/// Returns an error if reading the backing or writing the file fails.
pub fn rewrite(
    backing: &Backing,
    file: &File,
    truncate: bool,
    config: &Config,
) -> CoreResult<Range<u64>> {
    let mut out = file;
    let start = out.stream_position()?;

    backing.try_for_each_chunk(config.copy_chunk_size, &mut |chunk: &[u8]| -> CoreResult<()> {
        out.write_all(chunk)?;
        Ok(())
    })?;

    let end = out.stream_position()?;
    if truncate {
        file.set_len(end)?;
    }

    Ok(start..end)
}

/// Replaces the resource fork of `file` with the content of `backing` and
/// returns the bytes written.
///
/// # Errors
///
/// Returns an error if reading the backing or setting the attribute fails.
pub fn rewrite_resource_fork(
    backing: &Backing,
    file: &File,
    config: &Config,
) -> CoreResult<Vec<u8>> {
    let mut data = Vec::with_capacity(usize::try_from(backing.size()).unwrap_or(0));
    backing.try_for_each_chunk(config.copy_chunk_size, &mut |chunk: &[u8]| -> CoreResult<()> {
        data.extend_from_slice(chunk);
        Ok(())
    })?;

    if let Err(err) = file.remove_xattr(RESOURCE_FORK_ATTRIBUTE) {
        trace!(%err, "no resource fork to remove");
    }
    file.set_xattr(RESOURCE_FORK_ATTRIBUTE, &data)?;

    debug!(bytes = data.len(), "wrote resource fork");
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use splicebuf_storage::DescriptorKind;
    use std::fs::OpenOptions;
    use tempfile::NamedTempFile;
    use xattr::FileExt as _;

    fn read_write(file: &NamedTempFile) -> File {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(file.path())
            .unwrap()
    }

    #[test]
    fn rewrite_streams_every_leaf() {
        let source = NamedTempFile::new().unwrap();
        std::fs::write(source.path(), b"file contents").unwrap();

        let mut backing = Backing::open(source.path(), DescriptorKind::File).unwrap();
        backing.replace_with_bytes(0..4, b"FILE");
        backing.replace_with_bytes(4..4, b"!");

        let dest = NamedTempFile::new().unwrap();
        std::fs::write(dest.path(), b"a much longer previous file").unwrap();

        let config = Config::default().copy_chunk_size(2);
        let written = write_to_file(&backing, &read_write(&dest), false, true, &config).unwrap();

        assert_eq!(written, 0..14);
        assert_eq!(std::fs::read(dest.path()).unwrap(), b"FILE! contents");
    }

    #[test]
    fn rewrite_without_truncate_keeps_tail() {
        let dest = NamedTempFile::new().unwrap();
        std::fs::write(dest.path(), b"0123456789").unwrap();

        let backing = Backing::from_bytes(b"abc".to_vec());
        rewrite(&backing, &read_write(&dest), false, &Config::default()).unwrap();

        assert_eq!(std::fs::read(dest.path()).unwrap(), b"abc3456789");
    }

    #[test]
    fn same_file_is_written_in_place() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"0123456789").unwrap();

        let mut backing = Backing::open(file.path(), DescriptorKind::File).unwrap();
        backing.replace_with_bytes(0..2, b"");

        write_to_file(&backing, &read_write(&file), false, true, &Config::default()).unwrap();
        assert_eq!(std::fs::read(file.path()).unwrap(), b"23456789");
    }

    #[test]
    fn resource_fork_is_replaced() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"data fork").unwrap();
        if file.as_file().set_xattr(RESOURCE_FORK_ATTRIBUTE, b"old fork").is_err() {
            // No user xattr support on this filesystem.
            return;
        }

        let backing = Backing::from_bytes(b"new".to_vec());
        let written = write_to_file(&backing, file.as_file(), true, false, &Config::default()).unwrap();

        assert_eq!(written, 0..3);
        assert_eq!(
            file.as_file().get_xattr(RESOURCE_FORK_ATTRIBUTE).unwrap(),
            Some(b"new".to_vec())
        );
        assert_eq!(std::fs::read(file.path()).unwrap(), b"data fork");
    }
}
