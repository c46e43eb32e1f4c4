//! Text segmentation for speech: splitting documents into speakable segments.

mod cache;
pub mod segmenter;

pub use cache::{DEFAULT_CACHE_CAPACITY, SegmentCache};
pub use segmenter::{DEFAULT_MAX_SEGMENT_LEN, Segmenter, split_segments};

use serde::Serialize;

/// One synthesis unit: a trimmed, sentence-terminated slice of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    /// Position of this segment in its sequence
    pub index: usize,
    /// The text handed to the speech engine
    pub text: String,
}

impl Segment {
    /// Create a new segment.
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}
