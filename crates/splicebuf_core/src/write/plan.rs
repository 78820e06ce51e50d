//! Planning an in-place rewrite of the file a backing reads from.
//!
//! A file-range leaf of an edited backing names bytes at some source offset
//! of the very file being rewritten. Once the leaves before it have grown or
//! shrunk, that source usually no longer lines up with the leaf's
//! destination, and writing earlier leaves can clobber it before it is read.
//!
//! The planner first collects the *affected* destination spans: every span
//! that will actually be written. A leaf whose source equals its destination
//! is left alone. Any other same-file leaf is split against those spans:
//! parts whose source overlaps an affected span are staged through a scratch
//! file before writing starts, the rest are copied directly.

use crate::backing::Backing;
use splicebuf_storage::{FileId, FileRangeBacking};
use std::ops::Range;

/// One step of an in-place write.
#[derive(Debug, Clone)]
pub enum PlanItem<'a> {
    /// Leave this many bytes of the file untouched.
    Skip(u64),
    /// Write literal bytes at the cursor.
    WriteLiteral(&'a [u8]),
    /// Copy a source range of the target file to the cursor.
    CopyInPlace(Range<u64>),
    /// Copy a source range of the target file to the cursor, from the copy
    /// staged in the scratch file.
    CopyViaScratch(Range<u64>),
    /// Stream a range of some other file (or a resource fork) to the cursor.
    CopyExternal(&'a FileRangeBacking),
}

impl PartialEq for PlanItem<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Skip(a), Self::Skip(b)) => a == b,
            (Self::WriteLiteral(a), Self::WriteLiteral(b)) => a == b,
            (Self::CopyInPlace(a), Self::CopyInPlace(b))
            | (Self::CopyViaScratch(a), Self::CopyViaScratch(b)) => a == b,
            (Self::CopyExternal(a), Self::CopyExternal(b)) => {
                a.descriptor().ptr_eq(b.descriptor()) && a.range() == b.range()
            }
            _ => false,
        }
    }
}

impl Eq for PlanItem<'_> {}

impl PlanItem<'_> {
    /// Returns the number of bytes this item advances the write cursor by.
    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            Self::Skip(len) => *len,
            Self::WriteLiteral(bytes) => bytes.len() as u64,
            Self::CopyInPlace(range) | Self::CopyViaScratch(range) => range.end - range.start,
            Self::CopyExternal(backing) => backing.range().end - backing.range().start,
        }
    }

    /// Returns `true` if the item moves the cursor by zero bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An ordered list of steps writing a backing into its own file.
#[derive(Debug, Clone)]
pub struct WritePlan<'a> {
    start: u64,
    items: Vec<PlanItem<'a>>,
}

impl<'a> WritePlan<'a> {
    /// Returns the file offset the first item writes at.
    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Returns the steps in execution order.
    #[must_use]
    pub fn items(&self) -> &[PlanItem<'a>] {
        &self.items
    }

    /// Returns the file offset just past the last written byte.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.start + self.items.iter().map(PlanItem::len).sum::<u64>()
    }

    /// Returns the source ranges that must be staged, in order.
    pub fn scratch_ranges(&self) -> impl Iterator<Item = Range<u64>> + '_ {
        self.items.iter().filter_map(|item| match item {
            PlanItem::CopyViaScratch(range) => Some(range.clone()),
            _ => None,
        })
    }

    /// Returns the total number of bytes staged through scratch.
    #[must_use]
    pub fn scratch_len(&self) -> u64 {
        self.scratch_ranges().map(|range| range.end - range.start).sum()
    }
}

/// Plans writing `backing` into the file identified by `target`, starting
/// at file offset `start`.
#[must_use]
pub fn plan_in_place(backing: &Backing, start: u64, target: FileId) -> WritePlan<'_> {
    let leaves = backing.leaves();
    let affected = affected_ranges(&leaves, start, target);
    let mut items = Vec::with_capacity(leaves.len());
    let mut cursor = start;

    for leaf in leaves {
        let len = leaf.size();

        match leaf {
            Backing::Memory(memory) => items.push(PlanItem::WriteLiteral(memory.as_slice())),
            Backing::FileRange(range) if range.descriptor().is_contents_of(target) => {
                let source = range.range();
                if source.start == cursor {
                    items.push(PlanItem::Skip(len));
                } else {
                    split_against(source, &affected, &mut items);
                }
            }
            Backing::FileRange(range) => items.push(PlanItem::CopyExternal(range)),
            // `leaves` never yields composites.
            Backing::Composite(_) => {}
        }

        cursor += len;
    }

    WritePlan { start, items }
}

/// Returns the destination spans that will be written, merged where they
/// touch.
fn affected_ranges(leaves: &[&Backing], start: u64, target: FileId) -> Vec<Range<u64>> {
    let mut ranges: Vec<Range<u64>> = Vec::new();
    let mut cursor = start;

    for leaf in leaves {
        let span = cursor..cursor + leaf.size();
        cursor = span.end;

        let untouched = match leaf {
            Backing::FileRange(range) => {
                range.descriptor().is_contents_of(target) && range.range().start == span.start
            }
            _ => false,
        };

        if untouched || span.is_empty() {
            continue;
        }

        match ranges.last_mut() {
            Some(last) if last.end == span.start => last.end = span.end,
            _ => ranges.push(span),
        }
    }

    ranges
}

/// Splits a same-file source range into direct and scratch copies.
fn split_against(source: Range<u64>, affected: &[Range<u64>], items: &mut Vec<PlanItem<'_>>) {
    let mut remaining = source;

    for span in affected {
        if span.end <= remaining.start || span.start >= remaining.end {
            continue;
        }

        let overlap = remaining.start.max(span.start)..remaining.end.min(span.end);
        if overlap.start > remaining.start {
            items.push(PlanItem::CopyInPlace(remaining.start..overlap.start));
        }
        items.push(PlanItem::CopyViaScratch(overlap.clone()));
        remaining = overlap.end..remaining.end;
    }

    if !remaining.is_empty() {
        items.push(PlanItem::CopyInPlace(remaining));
    }
}
