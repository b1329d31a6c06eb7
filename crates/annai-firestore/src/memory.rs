//! In-process store for local development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use annai_models::{McqContent, McqId, McqRecord, NewMcq, NewVideo, VideoId, VideoRecord};

use crate::error::FirestoreResult;
use crate::store::{McqStore, UpdateOutcome, VideoStore};

/// Keeps videos and questions in memory. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    videos: RwLock<HashMap<VideoId, VideoRecord>>,
    mcqs: RwLock<Vec<McqRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn video_count(&self) -> usize {
        self.videos.read().await.len()
    }

    pub async fn mcq_count(&self) -> usize {
        self.mcqs.read().await.len()
    }
}

#[async_trait]
impl VideoStore for MemoryStore {
    async fn insert_video(&self, video: NewVideo) -> FirestoreResult<VideoRecord> {
        let record = VideoRecord::from_new(VideoId::new(), video);
        self.videos
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_video(&self, id: &VideoId) -> FirestoreResult<Option<VideoRecord>> {
        Ok(self.videos.read().await.get(id).cloned())
    }

    async fn ping(&self) -> FirestoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl McqStore for MemoryStore {
    async fn insert_mcqs(
        &self,
        video_id: &VideoId,
        uid: Option<&str>,
        mcqs: Vec<NewMcq>,
    ) -> FirestoreResult<usize> {
        let now = Utc::now();
        let mut store = self.mcqs.write().await;
        let count = mcqs.len();

        for (position, mcq) in mcqs.into_iter().enumerate() {
            store.push(McqRecord {
                id: McqId::new(),
                uid: uid.map(str::to_string),
                video_id: video_id.clone(),
                segment_index: mcq.segment_index,
                question: mcq.draft.question,
                options: mcq.draft.options,
                answer: mcq.draft.answer,
                position: position as u32,
                created_at: Some(now),
            });
        }

        Ok(count)
    }

    async fn list_mcqs(&self, video_id: &VideoId) -> FirestoreResult<Vec<McqRecord>> {
        let store = self.mcqs.read().await;
        let mut found: Vec<McqRecord> = store
            .iter()
            .filter(|m| &m.video_id == video_id)
            .cloned()
            .collect();
        found.sort_by_key(|m| m.position);
        Ok(found)
    }

    async fn get_mcq(&self, id: &McqId) -> FirestoreResult<Option<McqRecord>> {
        Ok(self.mcqs.read().await.iter().find(|m| &m.id == id).cloned())
    }

    async fn replace_mcq_content(
        &self,
        id: &McqId,
        content: McqContent,
    ) -> FirestoreResult<UpdateOutcome> {
        let mut store = self.mcqs.write().await;
        let Some(record) = store.iter_mut().find(|m| &m.id == id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        if record.content() == content {
            return Ok(UpdateOutcome::Unchanged);
        }
        record.apply(content);
        Ok(UpdateOutcome::Updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annai_models::{McqDraft, Principal};

    fn new_video() -> NewVideo {
        NewVideo {
            owner: Some(Principal::new("u1", None)),
            filename: "f.mp4".into(),
            original_filename: "f.mp4".into(),
            storage_key: "f.mp4".into(),
            uploaded_at: Utc::now(),
            full_transcript: "one two three".into(),
            segments: vec!["one two".into(), "three".into()],
        }
    }

    fn draft(q: &str) -> McqDraft {
        McqDraft {
            question: q.into(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            answer: "a".into(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_video() {
        let store = MemoryStore::new();
        let video = store.insert_video(new_video()).await.unwrap();
        let loaded = store.get_video(&video.id).await.unwrap().unwrap();
        assert_eq!(loaded, video);
        assert!(store.get_video(&VideoId::from("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_mcqs_preserves_order_and_scope() {
        let store = MemoryStore::new();
        let v1 = VideoId::from("v1");
        let v2 = VideoId::from("v2");

        store
            .insert_mcqs(
                &v1,
                Some("u1"),
                vec![
                    NewMcq::new(0, draft("first")),
                    NewMcq::new(0, draft("second")),
                    NewMcq::new(1, draft("third")),
                ],
            )
            .await
            .unwrap();
        store
            .insert_mcqs(&v2, None, vec![NewMcq::new(0, draft("other"))])
            .await
            .unwrap();

        let listed = store.list_mcqs(&v1).await.unwrap();
        let questions: Vec<_> = listed.iter().map(|m| m.question.as_str()).collect();
        assert_eq!(questions, vec!["first", "second", "third"]);
        assert!(listed.iter().all(|m| m.uid.as_deref() == Some("u1")));
        assert!(store.list_mcqs(&VideoId::from("none")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_outcomes() {
        let store = MemoryStore::new();
        let vid = VideoId::from("v1");
        store
            .insert_mcqs(&vid, None, vec![NewMcq::new(0, draft("q"))])
            .await
            .unwrap();
        let id = store.list_mcqs(&vid).await.unwrap()[0].id.clone();

        let same: McqContent = draft("q").into();
        assert_eq!(
            store.replace_mcq_content(&id, same).await.unwrap(),
            UpdateOutcome::Unchanged
        );

        let changed: McqContent = draft("new").into();
        assert_eq!(
            store.replace_mcq_content(&id, changed).await.unwrap(),
            UpdateOutcome::Updated
        );
        assert_eq!(store.get_mcq(&id).await.unwrap().unwrap().question, "new");

        assert_eq!(
            store
                .replace_mcq_content(&McqId::from("missing"), draft("x").into())
                .await
                .unwrap(),
            UpdateOutcome::NotFound
        );
    }
}
