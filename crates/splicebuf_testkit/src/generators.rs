//! Property-based test generators using proptest.
//!
//! Edits are generated independently of the buffer they will hit and are
//! clamped into bounds when applied, so any sequence is valid for any
//! starting contents.

use proptest::prelude::*;
use splicebuf_core::{CoreResult, DataBuffer, UndoHistory};
use std::ops::Range;

/// A replace operation with unclamped coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// Requested start; reduced modulo `size + 1`.
    pub at: u64,
    /// Requested number of bytes to remove; clamped to what follows `at`.
    pub remove: u64,
    /// Bytes to insert.
    pub insert: Vec<u8>,
}

impl Edit {
    /// Returns the in-bounds range this edit replaces in content of
    /// `size` bytes.
    #[must_use]
    pub fn range(&self, size: u64) -> Range<u64> {
        let start = self.at % (size + 1);
        let end = start + self.remove.min(size - start);
        start..end
    }

    /// Applies the edit to a plain byte vector.
    pub fn apply_to_model(&self, model: &mut Vec<u8>) {
        let range = self.range(model.len() as u64);
        model.splice(
            range.start as usize..range.end as usize,
            self.insert.iter().copied(),
        );
    }

    /// Applies the edit to a buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer rejects the replace.
    pub fn apply_to_buffer(&self, buffer: &DataBuffer) -> CoreResult<()> {
        buffer.replace(self.range(buffer.size()), &self.insert)
    }

    /// Applies the edit to a buffer through an undo history.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer rejects the replace.
    pub fn apply_with_history(
        &self,
        buffer: &DataBuffer,
        history: &mut UndoHistory,
    ) -> CoreResult<()> {
        history.replace(buffer, self.range(buffer.size()), &self.insert)
    }
}

/// Strategy for generating arbitrary buffer contents.
pub fn contents_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Strategy for bytes drawn from a small alphabet, so generated patterns
/// actually occur in generated contents.
pub fn narrow_bytes_strategy(len: Range<usize>) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::sample::select(b"abAB\0".to_vec()), len)
}

/// Strategy for generating a single edit.
pub fn edit_strategy() -> impl Strategy<Value = Edit> {
    let insert = prop_oneof![
        // Deletion
        Just(Vec::new()),
        // Short insertion or overwrite
        prop::collection::vec(any::<u8>(), 1..8),
        // Larger insertion
        prop::collection::vec(any::<u8>(), 8..64),
    ];

    (any::<u64>(), 0u64..48, insert).prop_map(|(at, remove, insert)| Edit {
        at,
        remove,
        insert,
    })
}

/// Strategy for generating a sequence of edits.
pub fn edit_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<Edit>> {
    prop::collection::vec(edit_strategy(), 1..=max_len)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for tests that touch the file system.
    #[must_use]
    pub fn file_backed() -> Self {
        Self {
            cases: 64,
            max_shrink_iters: 200,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_range_is_clamped() {
        let edit = Edit {
            at: 17,
            remove: 100,
            insert: Vec::new(),
        };
        assert_eq!(edit.range(10), 6..10);
        assert_eq!(edit.range(0), 0..0);
    }

    #[test]
    fn model_splice() {
        let mut model = b"0123456789".to_vec();
        Edit {
            at: 2,
            remove: 3,
            insert: b"xy".to_vec(),
        }
        .apply_to_model(&mut model);
        assert_eq!(model, b"01xy56789");
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn edit_range_in_bounds(edit in edit_strategy(), size in 0u64..1000) {
            let range = edit.range(size);
            prop_assert!(range.start <= range.end);
            prop_assert!(range.end <= size);
        }

        #[test]
        fn narrow_bytes_use_alphabet(bytes in narrow_bytes_strategy(0..32)) {
            prop_assert!(bytes.iter().all(|b| b"abAB\0".contains(b)));
        }
    }
}
