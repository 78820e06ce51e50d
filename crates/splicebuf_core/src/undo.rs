//! Undo and redo over buffer snapshots.
//!
//! Each recorded edit keeps a [`Backing`] slice of the bytes it replaced.
//! Slices of file-backed content cost no memory, but they stop working once
//! their descriptor is closed; [`UndoHistory::materialize`] copies them into
//! memory beforehand.

use crate::backing::Backing;
use crate::buffer::DataBuffer;
use crate::error::CoreResult;
use std::ops::Range;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct Entry {
    /// Content to splice back in.
    snapshot: Backing,
    /// Range currently holding the content that `snapshot` replaces.
    range: Range<u64>,
}

/// Undo and redo stacks for one buffer.
#[derive(Debug, Default, Clone)]
pub struct UndoHistory {
    undo: Vec<Entry>,
    redo: Vec<Entry>,
}

impl UndoHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces `range` of `buffer` with `bytes`, recording the edit.
    ///
    /// # Errors
    ///
    /// Returns an error if `range` is out of bounds.
    pub fn replace(
        &mut self,
        buffer: &DataBuffer,
        range: Range<u64>,
        bytes: &[u8],
    ) -> CoreResult<()> {
        self.replace_with_backing(buffer, range, Backing::from_bytes(bytes))
    }

    /// Replaces `range` of `buffer` with `new`, recording the edit. Clears
    /// the redo stack.
    ///
    /// # Errors
    ///
    /// Returns an error if `range` is out of bounds.
    pub fn replace_with_backing(
        &mut self,
        buffer: &DataBuffer,
        range: Range<u64>,
        new: Backing,
    ) -> CoreResult<()> {
        let snapshot = buffer.snapshot(range.clone())?;
        let inserted = range.start..range.start + new.size();

        buffer.replace_with_backing(range, new)?;

        self.undo.push(Entry {
            snapshot,
            range: inserted,
        });
        self.redo.clear();
        Ok(())
    }

    /// Reverts the most recent edit. Returns `false` if there was none.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer no longer covers the edited range;
    /// the entry is kept.
    pub fn undo(&mut self, buffer: &DataBuffer) -> CoreResult<bool> {
        let Some(entry) = self.undo.pop() else {
            return Ok(false);
        };

        match apply(buffer, &entry) {
            Ok(inverse) => {
                self.redo.push(inverse);
                Ok(true)
            }
            Err(err) => {
                self.undo.push(entry);
                Err(err)
            }
        }
    }

    /// Reapplies the most recently undone edit. Returns `false` if there was
    /// none.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer no longer covers the edited range;
    /// the entry is kept.
    pub fn redo(&mut self, buffer: &DataBuffer) -> CoreResult<bool> {
        let Some(entry) = self.redo.pop() else {
            return Ok(false);
        };

        match apply(buffer, &entry) {
            Ok(inverse) => {
                self.undo.push(inverse);
                Ok(true)
            }
            Err(err) => {
                self.redo.push(entry);
                Err(err)
            }
        }
    }

    /// Returns `true` if there is an edit to undo.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Returns `true` if there is an edit to redo.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Returns the number of undoable edits.
    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    /// Returns the number of redoable edits.
    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Forgets all recorded edits.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Copies file-backed snapshots of at most `limit` bytes into memory,
    /// newest first.
    ///
    /// The first snapshot larger than `limit` is dropped together with every
    /// older entry of its stack. Returns the number of entries dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if reading a snapshot fails. Entries converted so
    /// far stay converted.
    pub fn materialize(&mut self, limit: u64) -> CoreResult<usize> {
        let dropped =
            materialize_stack(&mut self.undo, limit)? + materialize_stack(&mut self.redo, limit)?;

        if dropped > 0 {
            warn!(dropped, limit, "dropped undo entries too large to keep in memory");
        } else {
            debug!(
                undo = self.undo.len(),
                redo = self.redo.len(),
                "materialized undo history"
            );
        }

        Ok(dropped)
    }
}

/// Splices `entry` into `buffer` and returns the entry undoing that.
fn apply(buffer: &DataBuffer, entry: &Entry) -> CoreResult<Entry> {
    let snapshot = buffer.snapshot(entry.range.clone())?;
    let restored = entry.range.start..entry.range.start + entry.snapshot.size();

    buffer.replace_with_backing(entry.range.clone(), entry.snapshot.clone())?;

    Ok(Entry {
        snapshot,
        range: restored,
    })
}

fn materialize_stack(stack: &mut Vec<Entry>, limit: u64) -> CoreResult<usize> {
    let mut keep_from = 0;

    for index in (0..stack.len()).rev() {
        let entry = &mut stack[index];
        if matches!(entry.snapshot, Backing::Memory(_)) {
            continue;
        }
        if entry.snapshot.size() > limit {
            keep_from = index + 1;
            break;
        }
        entry.snapshot = entry.snapshot.to_memory()?;
    }

    stack.drain(..keep_from);
    Ok(keep_from)
}
