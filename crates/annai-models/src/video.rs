//! Video records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::principal::Principal;

/// Unique identifier for an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A video that has not been persisted yet.
///
/// The store assigns the identity on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVideo {
    /// Uploader, if the request carried one
    pub owner: Option<Principal>,
    /// Stored (collision-resistant) file name
    pub filename: String,
    /// Name the client sent
    pub original_filename: String,
    /// Key of the upload in storage
    pub storage_key: String,
    /// Ingestion time
    pub uploaded_at: DateTime<Utc>,
    /// Transcript as returned by the transcription service
    pub full_transcript: String,
    /// Transcript segments, in generation order
    pub segments: Vec<String>,
}

/// Video record stored in the `videos` collection.
///
/// Written once per successful transcription and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    #[serde(rename = "_id")]
    pub id: VideoId,

    /// Owner user ID
    pub uid: Option<String>,

    /// Owner email
    pub email: Option<String>,

    /// Stored file name
    pub filename: String,

    /// File name as uploaded
    #[serde(default)]
    pub original_filename: String,

    /// Storage key of the uploaded media
    #[serde(default)]
    pub storage_key: String,

    /// Upload timestamp
    pub uploaded_at: DateTime<Utc>,

    /// Full transcript text
    pub full_transcript: String,

    /// Ordered transcript segments
    pub segments: Vec<String>,
}

impl VideoRecord {
    /// Materialize a new video under the given identity.
    pub fn from_new(id: VideoId, video: NewVideo) -> Self {
        let (uid, email) = match video.owner {
            Some(p) => (Some(p.uid), p.email),
            None => (None, None),
        };

        Self {
            id,
            uid,
            email,
            filename: video.filename,
            original_filename: video.original_filename,
            storage_key: video.storage_key,
            uploaded_at: video.uploaded_at,
            full_transcript: video.full_transcript,
            segments: video.segments,
        }
    }

    /// Whether `index` addresses one of this video's segments.
    pub fn has_segment(&self, index: u32) -> bool {
        (index as usize) < self.segments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewVideo {
        NewVideo {
            owner: Some(Principal::new("user-1", Some("a@b.c".to_string()))),
            filename: "1700000000000-abcd1234-lecture.mp4".to_string(),
            original_filename: "lecture.mp4".to_string(),
            storage_key: "uploads/1700000000000-abcd1234-lecture.mp4".to_string(),
            uploaded_at: Utc::now(),
            full_transcript: "a b c".to_string(),
            segments: vec!["a b".to_string(), "c".to_string()],
        }
    }

    #[test]
    fn test_video_id_unique() {
        assert_ne!(VideoId::new(), VideoId::new());
    }

    #[test]
    fn test_from_new_copies_owner() {
        let record = VideoRecord::from_new(VideoId::from("v1"), sample());
        assert_eq!(record.uid.as_deref(), Some("user-1"));
        assert_eq!(record.email.as_deref(), Some("a@b.c"));
        assert!(record.has_segment(1));
        assert!(!record.has_segment(2));
    }

    #[test]
    fn test_from_new_without_owner() {
        let mut video = sample();
        video.owner = None;
        let record = VideoRecord::from_new(VideoId::from("v1"), video);
        assert!(record.uid.is_none());
        assert!(record.email.is_none());
    }

    #[test]
    fn test_serialized_field_names() {
        let record = VideoRecord::from_new(VideoId::from("v1"), sample());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["_id"], "v1");
        assert!(json.get("fullTranscript").is_some());
        assert!(json.get("uploadedAt").is_some());
    }
}
