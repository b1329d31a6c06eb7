//! Shared data models for the Annai backend.
//!
//! This crate provides Serde-serializable types for:
//! - Uploaded videos and their transcripts
//! - Generated multiple-choice questions
//! - The authenticated principal
//! - Transcript segmentation

pub mod mcq;
pub mod principal;
pub mod segment;
pub mod video;

// Re-export common types
pub use mcq::{
    McqContent, McqDraft, McqId, McqRecord, NewMcq, OPTION_COUNT, SENTINEL_QUESTION, SENTINEL_VALUE,
};
pub use principal::Principal;
pub use segment::{segment_transcript, word_count, SegmentWindow, DEFAULT_SEGMENT_WORDS};
pub use video::{NewVideo, VideoId, VideoRecord};
