//! Locating the active segment inside the document for highlighting.

use serde::Serialize;

/// Byte range of a highlighted segment within the document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// The highlighted text. Returns `None` if the span does not fit `document`.
    pub fn slice<'a>(&self, document: &'a str) -> Option<&'a str> {
        document.get(self.start..self.end)
    }
}

/// Find the first case-insensitive occurrence of `segment` in `document`.
///
/// Offsets always fall on char boundaries of `document`. A segment whose text
/// was altered during segmentation (synthesized period, re-joined words) may
/// not be found. Repeated sentences always resolve to the first occurrence.
pub fn locate(document: &str, segment: &str) -> Option<Span> {
    locate_from(document, segment, 0)
}

/// Like [`locate`], but only matches starting at or after byte offset `from`.
pub fn locate_from(document: &str, segment: &str, from: usize) -> Option<Span> {
    let needle = segment.trim();
    let first = needle.chars().next()?;
    let rest = document.get(from..)?;

    rest.char_indices()
        .filter(|&(_, c)| eq_ignore_case(c, first))
        .find_map(|(offset, _)| {
            let start = from + offset;
            match_len(&document[start..], needle).map(|len| Span {
                start,
                end: start + len,
            })
        })
}

/// Bytes searched past the cursor by [`SequentialLocator`].
const SEQUENTIAL_WINDOW: usize = 4096;

/// Locates the segments of one document in reading order.
///
/// Each search starts where the previous segment ended and only looks a
/// bounded distance ahead, so locating every segment of a document is linear
/// in its length. Repeated sentences resolve to the occurrence being read.
pub struct SequentialLocator<'a> {
    document: &'a str,
    cursor: usize,
}

impl<'a> SequentialLocator<'a> {
    pub fn new(document: &'a str) -> Self {
        Self {
            document,
            cursor: 0,
        }
    }

    /// Locate the next segment. A segment that is not found still moves the
    /// cursor by half its length so later segments stay within reach.
    pub fn next_span(&mut self, segment: &str) -> Option<Span> {
        let needle = segment.trim();
        let end = floor_char_boundary(
            self.document,
            self.cursor + needle.len() + SEQUENTIAL_WINDOW,
        );
        let window = &self.document[..end];

        match locate_from(window, needle, self.cursor) {
            Some(span) => {
                self.cursor = span.end;
                Some(span)
            }
            None => {
                self.cursor = floor_char_boundary(self.document, self.cursor + needle.len() / 2);
                None
            }
        }
    }
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Byte length of the prefix of `haystack` matching `needle`, ignoring case.
fn match_len(haystack: &str, needle: &str) -> Option<usize> {
    let mut hay = haystack.char_indices();

    for expected in needle.chars() {
        let (_, found) = hay.next()?;
        if !eq_ignore_case(found, expected) {
            return None;
        }
    }

    Some(hay.next().map_or(haystack.len(), |(offset, _)| offset))
}

fn eq_ignore_case(a: char, b: char) -> bool {
    if a == b {
        return true;
    }
    if a.is_ascii() && b.is_ascii() {
        return a.eq_ignore_ascii_case(&b);
    }
    a.to_lowercase().eq(b.to_lowercase())
}
