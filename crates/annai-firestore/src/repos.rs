//! Typed repositories for videos and questions.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use annai_models::{McqContent, McqId, McqRecord, NewMcq, NewVideo, VideoId, VideoRecord};

use crate::client::{FirestoreClient, MAX_BATCH_WRITES};
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_documents_written;
use crate::store::{McqStore, UpdateOutcome, VideoStore};
use crate::types::{Document, FromFirestoreValue, StructuredQuery, ToFirestoreValue, Value, Write};

pub const VIDEOS_COLLECTION: &str = "videos";
pub const MCQS_COLLECTION: &str = "mcqs";

/// Repository for video documents.
#[derive(Clone)]
pub struct VideoRepository {
    client: FirestoreClient,
}

impl VideoRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VideoStore for VideoRepository {
    async fn insert_video(&self, video: NewVideo) -> FirestoreResult<VideoRecord> {
        let record = VideoRecord::from_new(VideoId::new(), video);
        let fields = video_to_fields(&record);

        self.client
            .create_document(VIDEOS_COLLECTION, record.id.as_str(), fields)
            .await?;
        record_documents_written(VIDEOS_COLLECTION, 1);

        info!(video_id = %record.id, segments = record.segments.len(), "Created video record");
        Ok(record)
    }

    async fn get_video(&self, id: &VideoId) -> FirestoreResult<Option<VideoRecord>> {
        match self.client.get_document(VIDEOS_COLLECTION, id.as_str()).await? {
            Some(doc) => Ok(Some(document_to_video(&doc, id)?)),
            None => Ok(None),
        }
    }

    async fn ping(&self) -> FirestoreResult<()> {
        self.client.check_connectivity(VIDEOS_COLLECTION).await
    }
}

/// Repository for question documents.
#[derive(Clone)]
pub struct McqRepository {
    client: FirestoreClient,
}

impl McqRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl McqStore for McqRepository {
    async fn insert_mcqs(
        &self,
        video_id: &VideoId,
        uid: Option<&str>,
        mcqs: Vec<NewMcq>,
    ) -> FirestoreResult<usize> {
        let now = Utc::now();
        let total = mcqs.len();

        let writes: Vec<Write> = mcqs
            .into_iter()
            .enumerate()
            .map(|(position, mcq)| {
                let record = McqRecord {
                    id: McqId::new(),
                    uid: uid.map(str::to_string),
                    video_id: video_id.clone(),
                    segment_index: mcq.segment_index,
                    question: mcq.draft.question,
                    options: mcq.draft.options,
                    answer: mcq.draft.answer,
                    position: position as u32,
                    created_at: Some(now),
                };
                let name = self
                    .client
                    .full_document_name(MCQS_COLLECTION, record.id.as_str());
                Write::create(name, mcq_to_fields(&record))
            })
            .collect();

        let mut written = 0;
        for chunk in writes.chunks(MAX_BATCH_WRITES) {
            self.client.batch_write(chunk.to_vec()).await?;
            written += chunk.len();
            record_documents_written(MCQS_COLLECTION, chunk.len());
            debug!(video_id = %video_id, written, total, "Wrote question batch");
        }

        Ok(written)
    }

    async fn list_mcqs(&self, video_id: &VideoId) -> FirestoreResult<Vec<McqRecord>> {
        // Ordering happens here so no composite index is needed
        let query =
            StructuredQuery::field_equals(MCQS_COLLECTION, "video_id", video_id.as_str().to_firestore_value());
        let docs = self.client.run_query(query).await?;

        let mut records = Vec::with_capacity(docs.len());
        for doc in &docs {
            match doc.id() {
                Some(id) => records.push(document_to_mcq(doc, &McqId::from(id))?),
                None => warn!(video_id = %video_id, "Skipping query result without a name"),
            }
        }
        records.sort_by_key(|m| m.position);
        Ok(records)
    }

    async fn get_mcq(&self, id: &McqId) -> FirestoreResult<Option<McqRecord>> {
        match self.client.get_document(MCQS_COLLECTION, id.as_str()).await? {
            Some(doc) => Ok(Some(document_to_mcq(&doc, id)?)),
            None => Ok(None),
        }
    }

    async fn replace_mcq_content(
        &self,
        id: &McqId,
        content: McqContent,
    ) -> FirestoreResult<UpdateOutcome> {
        let Some(current) = self.get_mcq(id).await? else {
            return Ok(UpdateOutcome::NotFound);
        };
        if current.content() == content {
            return Ok(UpdateOutcome::Unchanged);
        }

        let mut fields = HashMap::new();
        fields.insert("question".to_string(), content.question.to_firestore_value());
        fields.insert("options".to_string(), content.options.to_firestore_value());
        fields.insert("answer".to_string(), content.answer.to_firestore_value());

        let result = self
            .client
            .update_document(
                MCQS_COLLECTION,
                id.as_str(),
                fields,
                Some(vec![
                    "question".to_string(),
                    "options".to_string(),
                    "answer".to_string(),
                ]),
                true,
            )
            .await;

        match result {
            Ok(_) => Ok(UpdateOutcome::Updated),
            // Deleted between the read and the write
            Err(FirestoreError::NotFound(_)) => Ok(UpdateOutcome::NotFound),
            Err(e) => Err(e),
        }
    }
}

// Conversion helpers

fn video_to_fields(video: &VideoRecord) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("uid".to_string(), video.uid.to_firestore_value());
    fields.insert("email".to_string(), video.email.to_firestore_value());
    fields.insert("filename".to_string(), video.filename.to_firestore_value());
    fields.insert(
        "original_filename".to_string(),
        video.original_filename.to_firestore_value(),
    );
    fields.insert("storage_key".to_string(), video.storage_key.to_firestore_value());
    fields.insert("uploaded_at".to_string(), video.uploaded_at.to_firestore_value());
    fields.insert(
        "full_transcript".to_string(),
        video.full_transcript.to_firestore_value(),
    );
    fields.insert("segments".to_string(), video.segments.to_firestore_value());
    fields
}

fn document_to_video(doc: &Document, id: &VideoId) -> FirestoreResult<VideoRecord> {
    let fields = doc.require_fields()?;

    let get_string = |key: &str| -> Option<String> {
        fields.get(key).and_then(String::from_firestore_value)
    };

    Ok(VideoRecord {
        id: id.clone(),
        uid: get_string("uid"),
        email: get_string("email"),
        filename: get_string("filename").unwrap_or_default(),
        original_filename: get_string("original_filename").unwrap_or_default(),
        storage_key: get_string("storage_key").unwrap_or_default(),
        uploaded_at: fields
            .get("uploaded_at")
            .and_then(chrono::DateTime::from_firestore_value)
            .ok_or_else(|| {
                FirestoreError::invalid_response(format!("video {} has no uploaded_at", id))
            })?,
        full_transcript: get_string("full_transcript").unwrap_or_default(),
        segments: fields
            .get("segments")
            .and_then(Vec::<String>::from_firestore_value)
            .unwrap_or_default(),
    })
}

fn mcq_to_fields(mcq: &McqRecord) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("uid".to_string(), mcq.uid.to_firestore_value());
    fields.insert("video_id".to_string(), mcq.video_id.as_str().to_firestore_value());
    fields.insert("segment_index".to_string(), mcq.segment_index.to_firestore_value());
    fields.insert("question".to_string(), mcq.question.to_firestore_value());
    fields.insert("options".to_string(), mcq.options.to_firestore_value());
    fields.insert("answer".to_string(), mcq.answer.to_firestore_value());
    fields.insert("position".to_string(), mcq.position.to_firestore_value());
    fields.insert("created_at".to_string(), mcq.created_at.to_firestore_value());
    fields
}

fn document_to_mcq(doc: &Document, id: &McqId) -> FirestoreResult<McqRecord> {
    let fields = doc.require_fields()?;

    let get_string = |key: &str| -> Option<String> {
        fields.get(key).and_then(String::from_firestore_value)
    };
    let get_u32 = |key: &str| -> u32 {
        fields
            .get(key)
            .and_then(u32::from_firestore_value)
            .unwrap_or(0)
    };

    let video_id = get_string("video_id").ok_or_else(|| {
        FirestoreError::invalid_response(format!("question {} has no video_id", id))
    })?;

    Ok(McqRecord {
        id: id.clone(),
        uid: get_string("uid"),
        video_id: VideoId::from(video_id),
        segment_index: get_u32("segment_index"),
        question: get_string("question").unwrap_or_default(),
        options: fields
            .get("options")
            .and_then(Vec::<String>::from_firestore_value)
            .unwrap_or_default(),
        answer: get_string("answer").unwrap_or_default(),
        position: get_u32("position"),
        created_at: fields
            .get("created_at")
            .and_then(chrono::DateTime::from_firestore_value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use annai_models::Principal;

    #[test]
    fn test_video_field_round_trip() {
        let record = VideoRecord::from_new(
            VideoId::from("v1"),
            NewVideo {
                owner: Some(Principal::new("u1", Some("u1@example.com".into()))),
                filename: "1-abc-talk.mp4".into(),
                original_filename: "talk.mp4".into(),
                storage_key: "1-abc-talk.mp4".into(),
                uploaded_at: Utc::now(),
                full_transcript: "hello world".into(),
                segments: vec!["hello world".into()],
            },
        );

        let doc = Document::new(video_to_fields(&record));
        let decoded = document_to_video(&doc, &record.id).unwrap();
        assert_eq!(decoded.uid, record.uid);
        assert_eq!(decoded.segments, record.segments);
        assert_eq!(decoded.uploaded_at.timestamp(), record.uploaded_at.timestamp());
    }

    #[test]
    fn test_anonymous_mcq_fields() {
        let record = McqRecord {
            id: McqId::from("m1"),
            uid: None,
            video_id: VideoId::from("v1"),
            segment_index: 3,
            question: "Q".into(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            answer: "b".into(),
            position: 5,
            created_at: None,
        };

        let fields = mcq_to_fields(&record);
        assert_eq!(fields["uid"], Value::NullValue(()));

        let decoded = document_to_mcq(&Document::new(fields), &record.id).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_mcq_without_video_id_is_invalid() {
        let doc = Document::new(HashMap::new());
        assert!(matches!(
            document_to_mcq(&doc, &McqId::from("m1")),
            Err(FirestoreError::InvalidResponse(_))
        ));
    }
}
