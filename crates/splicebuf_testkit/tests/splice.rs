//! Splice round-trip, size law and compaction over memory and file
//! buffers.

use proptest::prelude::*;
use splicebuf_core::{Backing, DataBuffer};
use splicebuf_testkit::prelude::*;

fn check_edit(
    buffer: &DataBuffer,
    model: &mut Vec<u8>,
    edit: &Edit,
) -> Result<(), TestCaseError> {
    let before = buffer.size();
    let range = edit.range(before);
    let inserted = range.start..range.start + edit.insert.len() as u64;

    edit.apply_to_buffer(buffer).unwrap();
    edit.apply_to_model(model);

    prop_assert_eq!(
        buffer.size(),
        before - (range.end - range.start) + edit.insert.len() as u64
    );
    prop_assert_eq!(buffer.read(inserted).unwrap(), edit.insert.clone());
    prop_assert!(buffer.backing().is_compact());
    Ok(())
}

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn memory_edits_match_model(
        contents in contents_strategy(256),
        edits in edit_sequence_strategy(16),
    ) {
        let buffer = DataBuffer::from_bytes(contents.clone());
        let mut model = contents;

        for edit in &edits {
            check_edit(&buffer, &mut model, edit)?;
        }
        prop_assert_eq!(buffer.to_vec().unwrap(), model);
    }
}

proptest! {
    #![proptest_config(PropTestConfig::file_backed().to_proptest_config())]

    #[test]
    fn file_edits_match_model(
        contents in contents_strategy(512),
        edits in edit_sequence_strategy(24),
    ) {
        let file = TestFile::new(&contents);
        let buffer = file.buffer();
        let mut model = contents.clone();

        for edit in &edits {
            check_edit(&buffer, &mut model, edit)?;
        }
        prop_assert_eq!(buffer.to_vec().unwrap(), model);

        // Edits never touch the file itself.
        prop_assert_eq!(file.contents(), contents);
    }
}

#[test]
fn file_edit_splits_into_three_pieces() {
    let file = TestFile::new(&digits(20));
    let buffer = file.buffer();

    buffer.replace(5..8, b"abc").unwrap();
    let backing = buffer.backing();
    let children = backing.children();

    assert_eq!(children.len(), 3);
    assert!(matches!(children[0], Backing::FileRange(_)));
    assert!(matches!(children[1], Backing::Memory(_)));
    assert!(matches!(children[2], Backing::FileRange(_)));
    assert_eq!(buffer.to_vec().unwrap(), b"01234abc890123456789");
}

#[test]
fn adjacent_insertions_merge() {
    let file = TestFile::new(&digits(20));
    let buffer = file.buffer();

    buffer.replace(5..5, b"a").unwrap();
    buffer.replace(6..6, b"b").unwrap();
    buffer.replace(5..5, b"c").unwrap();

    let backing = buffer.backing();
    assert_eq!(backing.children().len(), 3);
    assert!(backing.is_compact());
    assert_eq!(buffer.read(3..10).unwrap(), b"34cab56");
}

#[test]
fn single_piece_collapses() {
    let file = TestFile::new(&digits(20));
    let buffer = file.buffer();

    buffer.replace(0..20, b"whole").unwrap();
    assert!(matches!(buffer.backing(), Backing::Memory(_)));

    buffer.replace(0..5, b"").unwrap();
    assert!(matches!(buffer.backing(), Backing::Memory(_)));
    assert!(buffer.is_empty());
}

#[test]
fn deleting_around_a_file_range_leaves_it_alone() {
    let file = TestFile::new(&digits(20));
    let buffer = file.buffer();

    buffer.replace(0..5, b"").unwrap();
    buffer.replace(10..15, b"").unwrap();

    assert!(matches!(buffer.backing(), Backing::FileRange(_)));
    assert_eq!(buffer.to_vec().unwrap(), b"5678901234");
}

#[test]
fn replace_across_children_keeps_content() {
    let file = TestFile::new(&digits(20));
    let buffer = file.buffer();

    buffer.replace(4..6, b"xx").unwrap();
    buffer.replace(10..12, b"yy").unwrap();
    buffer.replace(3..11, b"ZZZ").unwrap();

    assert_eq!(buffer.to_vec().unwrap(), b"012ZZZy23456789");
    assert!(buffer.backing().is_compact());
}

#[test]
fn out_of_bounds_replace_is_an_error() {
    let buffer = DataBuffer::from_bytes(digits(10));

    assert!(buffer.replace(8..11, b"x").is_err());
    assert!(buffer.replace(11..11, b"x").is_err());
    assert_eq!(buffer.to_vec().unwrap(), digits(10));
}
