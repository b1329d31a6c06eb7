//! Word-window segmentation of transcripts.
//!
//! A transcript is split on whitespace runs and regrouped into consecutive
//! windows of a fixed number of words. Each window becomes one segment and is
//! sent to question generation on its own.

use std::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Default number of words per segment.
pub const DEFAULT_SEGMENT_WORDS: usize = 750;

const DEFAULT_WINDOW: NonZeroUsize = match NonZeroUsize::new(DEFAULT_SEGMENT_WORDS) {
    Some(n) => n,
    None => panic!("default segment window must be non-zero"),
};

/// Number of words per segment. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct SegmentWindow(NonZeroUsize);

impl SegmentWindow {
    /// Create a window; returns `None` for zero.
    pub fn new(words: usize) -> Option<Self> {
        NonZeroUsize::new(words).map(Self)
    }

    /// Number of words in a full window.
    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for SegmentWindow {
    fn default() -> Self {
        Self(DEFAULT_WINDOW)
    }
}

impl TryFrom<usize> for SegmentWindow {
    type Error = String;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "segment window must be at least 1 word".to_string())
    }
}

impl From<SegmentWindow> for usize {
    fn from(window: SegmentWindow) -> Self {
        window.get()
    }
}

impl fmt::Display for SegmentWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} words", self.0)
    }
}

/// Split a transcript into consecutive word windows joined by single spaces.
///
/// The final segment may hold fewer than `window` words. A transcript that is
/// empty after trimming produces no segments at all.
pub fn segment_transcript(text: &str, window: SegmentWindow) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(window.get())
        .map(|chunk| chunk.join(" "))
        .collect()
}

/// Count whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
