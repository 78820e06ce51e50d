//! Byte pattern search over any [`ByteSource`].
//!
//! Unanchored searches use Quick Search (Sunday's variant of
//! Boyer-Moore-Horspool, after "A FAST Pattern Matching Algorithm" by
//! Sheik et al.) reading the source through two sliding windows, so
//! arbitrarily large file-backed buffers are scanned without loading them.

use splicebuf_storage::{ByteSource, StorageResult};
use std::ops::Range;

/// Options controlling a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Only match at the boundary of the search range.
    pub anchored: bool,
    /// Search from the end of the range towards the start.
    pub backwards: bool,
    /// Compare ASCII letters without regard to case.
    pub case_insensitive: bool,
}

impl SearchOptions {
    /// Creates options for a plain forward search.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the match must sit at the range boundary.
    #[must_use]
    pub const fn anchored(mut self, value: bool) -> Self {
        self.anchored = value;
        self
    }

    /// Sets whether to search backwards.
    #[must_use]
    pub const fn backwards(mut self, value: bool) -> Self {
        self.backwards = value;
        self
    }

    /// Sets whether ASCII case is ignored.
    #[must_use]
    pub const fn case_insensitive(mut self, value: bool) -> Self {
        self.case_insensitive = value;
        self
    }
}

/// Finds `pattern` within `range` of `source`.
///
/// Returns the absolute range of the match closest to the start of `range`
/// (or to its end, when searching backwards). Empty patterns, empty ranges
/// and patterns longer than the range never match.
///
/// `window` is the number of bytes fetched from `source` at a time; it is
/// raised above the pattern length if smaller.
///
/// # Errors
///
/// Returns an error if reading from `source` fails.
pub fn find<S: ByteSource + ?Sized>(
    source: &S,
    pattern: &[u8],
    options: SearchOptions,
    range: Range<u64>,
    window: usize,
) -> StorageResult<Option<Range<u64>>> {
    let size = source.size();

    // Offsets are tracked as i64 below.
    let end = range.end.min(size).min(i64::MAX as u64);
    let start = range.start.min(end);
    let len = pattern.len() as u64;

    if pattern.is_empty() || start >= end || len > end - start {
        return Ok(None);
    }

    if options.anchored {
        return find_anchored(source, pattern, options, start..end);
    }

    QuickSearch::new(source, pattern, options, start..end, window)?.run()
}

fn find_anchored<S: ByteSource + ?Sized>(
    source: &S,
    pattern: &[u8],
    options: SearchOptions,
    range: Range<u64>,
) -> StorageResult<Option<Range<u64>>> {
    let len = pattern.len() as u64;
    let candidate = if options.backwards {
        (range.end - len)..range.end
    } else {
        range.start..(range.start + len)
    };

    let bytes = source.read_range(candidate.clone())?;
    let matched = if options.case_insensitive {
        bytes.eq_ignore_ascii_case(pattern)
    } else {
        bytes == pattern
    };

    Ok(matched.then_some(candidate))
}

/// A fetched window of the source.
struct Window {
    range: Range<u64>,
    bytes: Vec<u8>,
}

impl Window {
    fn contains(&self, index: u64) -> bool {
        self.range.contains(&index)
    }
}

struct QuickSearch<'a, S: ?Sized> {
    source: &'a S,
    pattern: Vec<u8>,
    backwards: bool,
    case_insensitive: bool,
    skip: [u64; 256],
    range: Range<u64>,
    window_size: u64,
    current: Window,
    lookahead: Window,
}

impl<'a, S: ByteSource + ?Sized> QuickSearch<'a, S> {
    fn new(
        source: &'a S,
        pattern: &[u8],
        options: SearchOptions,
        range: Range<u64>,
        window: usize,
    ) -> StorageResult<Self> {
        let len = pattern.len();
        let pattern: Vec<u8> = if options.case_insensitive {
            pattern.to_ascii_uppercase()
        } else {
            pattern.to_vec()
        };

        // Distance from each byte's last occurrence (in scan order) to one
        // past the end of the pattern.
        let mut skip = [len as u64 + 1; 256];
        for i in 0..len {
            let byte = if options.backwards {
                pattern[len - 1 - i]
            } else {
                pattern[i]
            };
            skip[byte as usize] = (len - i) as u64;
        }

        // Wider than the pattern, so every byte a candidate touches lies in
        // the current window or the lookahead.
        let window_size = (window.max(len + 1) as u64).min(range.end - range.start);

        let mut search = Self {
            source,
            pattern,
            backwards: options.backwards,
            case_insensitive: options.case_insensitive,
            skip,
            range,
            window_size,
            current: Window {
                range: 0..0,
                bytes: Vec::new(),
            },
            lookahead: Window {
                range: 0..0,
                bytes: Vec::new(),
            },
        };

        let origin = if search.backwards {
            search.range.end
        } else {
            search.range.start
        };
        search.current = search.fetch(origin)?;
        search.lookahead = search.fetch(search.next_origin())?;

        Ok(search)
    }

    /// Reads the window that starts (or, backwards, ends) at `index`.
    fn fetch(&self, index: u64) -> StorageResult<Window> {
        let range = if self.backwards {
            index.saturating_sub(self.window_size).max(self.range.start)..index
        } else {
            index..index.saturating_add(self.window_size).min(self.range.end)
        };

        let bytes = self.source.read_range(range.clone())?;
        Ok(Window { range, bytes })
    }

    fn next_origin(&self) -> u64 {
        if self.backwards {
            self.current.range.start
        } else {
            self.current.range.end
        }
    }

    fn slide(&mut self) -> StorageResult<()> {
        let next = self.fetch(if self.backwards {
            self.lookahead.range.start
        } else {
            self.lookahead.range.end
        })?;
        self.current = std::mem::replace(&mut self.lookahead, next);
        Ok(())
    }

    fn byte(&self, index: i64) -> u8 {
        let index = index as u64;
        let byte = if self.current.contains(index) {
            self.current.bytes[(index - self.current.range.start) as usize]
        } else {
            debug_assert!(self.lookahead.contains(index));
            self.lookahead.bytes[(index - self.lookahead.range.start) as usize]
        };

        if self.case_insensitive {
            byte.to_ascii_uppercase()
        } else {
            byte
        }
    }

    fn run(mut self) -> StorageResult<Option<Range<u64>>> {
        let len = self.pattern.len() as i64;
        let begin = self.range.start as i64;
        let end = self.range.end as i64;
        let step: i64 = if self.backwards { -1 } else { 1 };

        let (first, last) = if self.backwards {
            (self.pattern[len as usize - 1], self.pattern[0])
        } else {
            (self.pattern[0], self.pattern[len as usize - 1])
        };

        let mut pointer = if self.backwards { end - 1 } else { begin };
        let limit = if self.backwards {
            begin + len - 1
        } else {
            end - len
        };

        while (self.backwards && pointer >= limit) || (!self.backwards && pointer <= limit) {
            while !self.current.contains(pointer as u64) {
                self.slide()?;
            }

            let far = pointer + step * (len - 1);

            if self.byte(pointer) == first && self.byte(far) == last && self.interior_matches(pointer, step) {
                let lower = pointer.min(far) as u64;
                return Ok(Some(lower..lower + len as u64));
            }

            if pointer == limit {
                break;
            }

            let next = self.byte(pointer + step * len);
            pointer += step * self.skip[next as usize] as i64;
        }

        Ok(None)
    }

    fn interior_matches(&self, pointer: i64, step: i64) -> bool {
        let len = self.pattern.len();

        (1..len.saturating_sub(1)).all(|i| {
            let expected = if self.backwards {
                self.pattern[len - 1 - i]
            } else {
                self.pattern[i]
            };
            self.byte(pointer + step * i as i64) == expected
        })
    }
}
