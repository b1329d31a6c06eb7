//! Persistence traits used by the API.
//!
//! Both the Firestore repositories and [`crate::MemoryStore`] implement
//! these, so the HTTP layer never depends on a concrete backend.

use async_trait::async_trait;

use annai_models::{McqContent, McqId, McqRecord, NewMcq, NewVideo, VideoId, VideoRecord};

use crate::error::FirestoreResult;

/// Result of replacing a question's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The stored content changed.
    Updated,
    /// The record exists but already held identical content.
    Unchanged,
    /// No record with that ID.
    NotFound,
}

impl UpdateOutcome {
    pub fn modified(self) -> bool {
        matches!(self, UpdateOutcome::Updated)
    }
}

#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Persist a new video and return it with its assigned identity.
    async fn insert_video(&self, video: NewVideo) -> FirestoreResult<VideoRecord>;

    async fn get_video(&self, id: &VideoId) -> FirestoreResult<Option<VideoRecord>>;

    /// Confirm the backend is reachable.
    async fn ping(&self) -> FirestoreResult<()>;
}

#[async_trait]
pub trait McqStore: Send + Sync {
    /// Insert a video's questions in order. Returns the number stored.
    async fn insert_mcqs(
        &self,
        video_id: &VideoId,
        uid: Option<&str>,
        mcqs: Vec<NewMcq>,
    ) -> FirestoreResult<usize>;

    /// All questions for a video, in insertion order.
    async fn list_mcqs(&self, video_id: &VideoId) -> FirestoreResult<Vec<McqRecord>>;

    async fn get_mcq(&self, id: &McqId) -> FirestoreResult<Option<McqRecord>>;

    /// Overwrite question, options and answer of one record.
    async fn replace_mcq_content(
        &self,
        id: &McqId,
        content: McqContent,
    ) -> FirestoreResult<UpdateOutcome>;
}
