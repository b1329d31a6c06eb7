//! Multiple-choice question models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::video::VideoId;

/// Every question carries exactly this many options.
pub const OPTION_COUNT: usize = 4;

/// Question text of the placeholder stored when generation fails.
pub const SENTINEL_QUESTION: &str = "Failed to generate MCQ";

/// Option and answer text of the placeholder stored when generation fails.
pub const SENTINEL_VALUE: &str = "N/A";

/// Unique identifier for a stored question.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct McqId(pub String);

impl McqId {
    /// Generate a new random question ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for McqId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for McqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for McqId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for McqId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A generated question candidate for one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct McqDraft {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
}

impl McqDraft {
    /// Placeholder recorded for a segment whose generation call failed.
    pub fn sentinel() -> Self {
        Self {
            question: SENTINEL_QUESTION.to_string(),
            options: vec![SENTINEL_VALUE.to_string(); OPTION_COUNT],
            answer: SENTINEL_VALUE.to_string(),
        }
    }

    /// True when the draft has a question, exactly four options and an answer.
    pub fn is_well_formed(&self) -> bool {
        !self.question.trim().is_empty()
            && self.options.len() == OPTION_COUNT
            && !self.answer.trim().is_empty()
    }
}

/// A draft tagged with the segment it was generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMcq {
    pub segment_index: u32,
    pub draft: McqDraft,
}

impl NewMcq {
    pub fn new(segment_index: u32, draft: McqDraft) -> Self {
        Self {
            segment_index,
            draft,
        }
    }
}

/// The editable part of a stored question.
///
/// The answer is not checked against the options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct McqContent {
    #[validate(length(min = 1, message = "question cannot be empty"))]
    pub question: String,

    #[validate(length(equal = 4, message = "exactly four options are required"))]
    pub options: Vec<String>,

    pub answer: String,
}

impl From<McqDraft> for McqContent {
    fn from(draft: McqDraft) -> Self {
        Self {
            question: draft.question,
            options: draft.options,
            answer: draft.answer,
        }
    }
}

/// Question record stored in the `mcqs` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct McqRecord {
    #[serde(rename = "_id")]
    pub id: McqId,

    /// Owner user ID
    pub uid: Option<String>,

    /// Video this question was generated for
    pub video_id: VideoId,

    /// 0-based index into the video's segments
    pub segment_index: u32,

    pub question: String,

    pub options: Vec<String>,

    pub answer: String,

    /// Insertion ordinal within the video's batch
    #[serde(skip_serializing, default)]
    pub position: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl McqRecord {
    /// Editable fields of this record.
    pub fn content(&self) -> McqContent {
        McqContent {
            question: self.question.clone(),
            options: self.options.clone(),
            answer: self.answer.clone(),
        }
    }

    /// Replace question, options and answer.
    pub fn apply(&mut self, content: McqContent) {
        self.question = content.question;
        self.options = content.options;
        self.answer = content.answer;
    }
}
