//! Executing a [`WritePlan`] against its target file.

use super::plan::{plan_in_place, PlanItem, WritePlan};
use crate::backing::Backing;
use crate::config::Config;
use crate::error::CoreResult;
use splicebuf_storage::{ByteSource, FileId, FileRangeBacking, SharedDescriptor, StorageError};
use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::ops::Range;
use std::os::unix::fs::FileExt;
use tracing::debug;

/// Writes `backing` into `file`, which one or more of its leaves read from,
/// starting at the file's current position.
///
/// Bytes that are already in place are not rewritten. Source bytes that
/// would be overwritten before being read are first copied into a scratch
/// file, which is removed again when this returns. Same-file bytes are read
/// through the backing's own descriptor, so `file` only needs to be
/// writable.
///
/// On success the position is left just past the written content, and the
/// file offsets written are returned. With `truncate`, anything after them
/// is cut off; otherwise trailing bytes of a longer file are kept.
///
/// # Errors
///
/// Returns an error if any read, write, or the scratch file fails. A closed
/// source descriptor is reported before anything is written; other failures
/// may leave the file partially rewritten.
pub fn write_in_place(
    backing: &Backing,
    file: &File,
    truncate: bool,
    config: &Config,
) -> CoreResult<Range<u64>> {
    let mut handle = file;
    let start = handle.stream_position()?;
    let target = FileId::of(file)?;

    let source = backing
        .file_ranges()
        .map(FileRangeBacking::descriptor)
        .find(|descriptor| descriptor.is_contents_of(target));
    if source.is_some_and(SharedDescriptor::is_closed) {
        return Err(StorageError::Closed.into());
    }

    let plan = plan_in_place(backing, start, target);
    debug!(
        start,
        items = plan.items().len(),
        scratch_bytes = plan.scratch_len(),
        "planned in-place write"
    );

    let scratch = stage_scratch(&plan, source, config)?;
    let end = execute(&plan, file, source, scratch.as_ref(), config.copy_chunk_size)?;

    if truncate && end < file.metadata()?.len() {
        file.set_len(end)?;
    }
    handle.seek(SeekFrom::Start(end))?;

    Ok(start..end)
}

fn same_file_source(source: Option<&SharedDescriptor>) -> io::Result<&SharedDescriptor> {
    source.ok_or_else(|| io::Error::other("no descriptor reads the target file"))
}

/// Copies every scratch range of `plan` out of `source`, in plan order.
fn stage_scratch(
    plan: &WritePlan<'_>,
    source: Option<&SharedDescriptor>,
    config: &Config,
) -> CoreResult<Option<File>> {
    if plan.scratch_len() == 0 {
        return Ok(None);
    }

    let source = same_file_source(source)?;
    let scratch = match &config.scratch_dir {
        Some(dir) => tempfile::tempfile_in(dir)?,
        None => tempfile::tempfile()?,
    };

    let mut offset = 0;
    for range in plan.scratch_ranges() {
        let len = range.end - range.start;
        copy_from_descriptor(source, range.start, &scratch, offset, len, config.copy_chunk_size)?;
        offset += len;
    }

    debug!(bytes = offset, "staged scratch copy");
    Ok(Some(scratch))
}

fn execute(
    plan: &WritePlan<'_>,
    file: &File,
    source: Option<&SharedDescriptor>,
    scratch: Option<&File>,
    chunk_size: usize,
) -> CoreResult<u64> {
    let mut cursor = plan.start();
    let mut staged = 0;

    for item in plan.items() {
        let len = item.len();

        match item {
            PlanItem::Skip(_) => {}
            PlanItem::WriteLiteral(bytes) => file.write_all_at(bytes, cursor)?,
            PlanItem::CopyInPlace(range) => {
                let source = same_file_source(source)?;
                copy_from_descriptor(source, range.start, file, cursor, len, chunk_size)?;
            }
            PlanItem::CopyViaScratch(_) => {
                let scratch = scratch.ok_or_else(|| io::Error::other("scratch file missing"))?;
                copy_between(scratch, staged, file, cursor, len, chunk_size)?;
                staged += len;
            }
            PlanItem::CopyExternal(backing) => copy_external(backing, file, cursor, chunk_size)?,
        }

        cursor += len;
    }

    Ok(cursor)
}

fn chunk_buffer(chunk_size: usize, len: u64) -> Vec<u8> {
    vec![0u8; chunk_size.max(1).min(usize::try_from(len).unwrap_or(usize::MAX))]
}

/// Copies `len` bytes of the file behind `source` at `from` to `dest` at
/// `to`, in ascending chunks.
fn copy_from_descriptor(
    source: &SharedDescriptor,
    from: u64,
    dest: &File,
    to: u64,
    len: u64,
    chunk_size: usize,
) -> CoreResult<()> {
    let mut buf = chunk_buffer(chunk_size, len);
    let mut done = 0;

    while done < len {
        let n = buf.len().min(usize::try_from(len - done).unwrap_or(usize::MAX));
        if source.read_at(from + done, &mut buf[..n])? < n {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file ended before its range",
            )
            .into());
        }
        dest.write_all_at(&buf[..n], to + done)?;
        done += n as u64;
    }

    Ok(())
}

/// Copies `len` bytes from `source` at `from` to `dest` at `to`, in
/// ascending chunks.
fn copy_between(
    source: &File,
    from: u64,
    dest: &File,
    to: u64,
    len: u64,
    chunk_size: usize,
) -> io::Result<()> {
    let mut buf = chunk_buffer(chunk_size, len);
    let mut done = 0;

    while done < len {
        let n = buf.len().min(usize::try_from(len - done).unwrap_or(usize::MAX));
        source.read_exact_at(&mut buf[..n], from + done)?;
        dest.write_all_at(&buf[..n], to + done)?;
        done += n as u64;
    }

    Ok(())
}

fn copy_external(
    backing: &FileRangeBacking,
    dest: &File,
    to: u64,
    chunk_size: usize,
) -> CoreResult<()> {
    let size = backing.size();
    let step = chunk_size.max(1) as u64;
    let mut offset = 0;

    while offset < size {
        let end = (offset + step).min(size);
        dest.write_all_at(&backing.read_range(offset..end)?, to + offset)?;
        offset = end;
    }

    Ok(())
}
