//! Upload pipeline: store, transcribe, segment, generate, persist.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{warn, Instrument, Span};

use annai_firestore::{McqStore, VideoStore};
use annai_ml_client::{McqGenerator, MlError, Transcriber};
use annai_models::{
    segment_transcript, word_count, McqDraft, NewMcq, NewVideo, Principal, VideoRecord,
};
use annai_storage::{store_upload, StorageError, StoredUpload, UploadBody, UploadStore};

use crate::config::{MalformedPolicy, PipelineConfig};
use crate::error::{ApiError, ApiResult};
use crate::logging::PipelineLogger;
use crate::metrics;
use crate::services::media::StoredMedia;

/// An upload already written to storage.
#[derive(Debug, Clone)]
pub struct IncomingUpload {
    pub original_name: String,
    pub stored: StoredUpload,
}

/// What one segment's generation call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentOutcome {
    /// Well-formed questions to store.
    Generated(Vec<McqDraft>),
    /// The call failed; one placeholder is stored.
    Failed,
    /// The payload was unusable; nothing is stored.
    Skipped,
}

impl SegmentOutcome {
    fn into_drafts(self) -> Vec<McqDraft> {
        match self {
            SegmentOutcome::Generated(drafts) => drafts,
            SegmentOutcome::Failed => vec![McqDraft::sentinel()],
            SegmentOutcome::Skipped => Vec::new(),
        }
    }
}

/// Result of a completed pipeline run.
#[derive(Debug, Clone)]
pub struct UploadSummary {
    pub video: VideoRecord,
    /// Question records stored, placeholders included
    pub mcq_count: usize,
    /// Segments that got the failure placeholder
    pub failed_segments: Vec<u32>,
    /// Segments that produced nothing
    pub skipped_segments: Vec<u32>,
}

/// Drives one upload end to end.
#[derive(Clone)]
pub struct UploadPipeline {
    videos: Arc<dyn VideoStore>,
    mcqs: Arc<dyn McqStore>,
    uploads: Arc<dyn UploadStore>,
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn McqGenerator>,
    config: PipelineConfig,
}

impl UploadPipeline {
    pub fn new(
        videos: Arc<dyn VideoStore>,
        mcqs: Arc<dyn McqStore>,
        uploads: Arc<dyn UploadStore>,
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn McqGenerator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            videos,
            mcqs,
            uploads,
            transcriber,
            generator,
            config,
        }
    }

    /// Stream an uploaded file into storage under a fresh name.
    ///
    /// A body that breaks off mid-stream is the client's fault and maps to
    /// 400; other storage failures are 500.
    pub async fn accept(
        &self,
        original_name: &str,
        content_type: &str,
        body: UploadBody<'_>,
    ) -> ApiResult<IncomingUpload> {
        let stored = store_upload(self.uploads.as_ref(), original_name, body, content_type)
            .await
            .map_err(|e| match e {
                StorageError::BodyRead(msg) => {
                    ApiError::bad_request(format!("Malformed upload: {}", msg))
                }
                other => ApiError::from(other),
            })?;

        Ok(IncomingUpload {
            original_name: original_name.to_string(),
            stored,
        })
    }

    /// Run on a separate task so a dropped client connection cannot stop
    /// the pipeline between writes.
    pub async fn run_detached(
        self,
        principal: Principal,
        upload: IncomingUpload,
    ) -> ApiResult<UploadSummary> {
        tokio::spawn(async move { self.run(principal, upload).await })
            .await
            .map_err(|e| ApiError::internal(format!("upload task failed: {}", e)))?
    }

    pub async fn run(&self, principal: Principal, upload: IncomingUpload) -> ApiResult<UploadSummary> {
        let start = Instant::now();
        let result = self.execute(principal, upload).await;

        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::record_upload(outcome, start.elapsed().as_secs_f64());
        result
    }

    async fn execute(&self, principal: Principal, upload: IncomingUpload) -> ApiResult<UploadSummary> {
        let IncomingUpload {
            original_name,
            stored,
        } = upload;
        let logger = PipelineLogger::new(&stored.filename, &principal.uid);
        let span = logger.create_span(&original_name);

        async move {
            logger.log_start(&format!("{} bytes stored as {}", stored.size, stored.key));

            let media = StoredMedia::new(Arc::clone(&self.uploads), stored.clone());
            let transcript = self
                .transcriber
                .transcribe(&media)
                .await
                .map_err(|e| {
                    metrics::record_upstream_failure("transcription", failure_kind(&e));
                    logger.log_error(&format!("transcription failed: {}", e));
                    ApiError::from(e)
                })?;

            let segments = segment_transcript(&transcript, self.config.segment_window);
            metrics::record_segments(segments.len());
            logger.log_progress(&format!(
                "{} words split into {} segments of up to {}",
                word_count(&transcript),
                segments.len(),
                self.config.segment_window
            ));

            let outcomes = self.generate_all(&segments).await;

            let video = self
                .videos
                .insert_video(NewVideo {
                    owner: Some(principal.clone()),
                    filename: stored.filename.clone(),
                    original_filename: original_name,
                    storage_key: stored.key,
                    uploaded_at: Utc::now(),
                    full_transcript: transcript,
                    segments,
                })
                .await?;
            Span::current().record("video_id", video.id.as_str());

            let mut failed_segments = Vec::new();
            let mut skipped_segments = Vec::new();
            let mut records = Vec::new();

            for (index, outcome) in outcomes.into_iter().enumerate() {
                let index = index as u32;
                match outcome {
                    SegmentOutcome::Failed => failed_segments.push(index),
                    SegmentOutcome::Skipped => skipped_segments.push(index),
                    SegmentOutcome::Generated(_) => {}
                }
                records.extend(
                    outcome
                        .into_drafts()
                        .into_iter()
                        .map(|draft| NewMcq::new(index, draft)),
                );
            }

            let mcq_count = if records.is_empty() {
                0
            } else {
                self.mcqs
                    .insert_mcqs(&video.id, Some(&principal.uid), records)
                    .await
                    .map_err(|e| {
                        logger.log_error(&format!(
                            "video {} stored without questions: {}",
                            video.id, e
                        ));
                        ApiError::from(e)
                    })?
            };

            if !failed_segments.is_empty() || !skipped_segments.is_empty() {
                logger.log_warning(&format!(
                    "segments with placeholders: {:?}, skipped: {:?}",
                    failed_segments, skipped_segments
                ));
            }
            logger.log_completion(&format!("video {} with {} questions", video.id, mcq_count));

            Ok::<_, ApiError>(UploadSummary {
                video,
                mcq_count,
                failed_segments,
                skipped_segments,
            })
        }
        .instrument(span)
        .await
    }

    /// Generate for every segment; outcomes come back in segment order.
    async fn generate_all(&self, segments: &[String]) -> Vec<SegmentOutcome> {
        stream::iter(segments.iter().cloned().enumerate())
            .map(|(index, segment)| async move {
                self.generate_segment(index as u32, &segment).await
            })
            .buffered(self.config.generation_concurrency.get())
            .collect()
            .await
    }

    async fn generate_segment(&self, index: u32, segment: &str) -> SegmentOutcome {
        let backend = self.generator.name();
        let span = tracing::info_span!("mcq_generation", segment_index = index, backend);

        async move {
            let error = match self.generator.generate(segment).await {
                Ok(drafts) => {
                    let total = drafts.len();
                    let usable: Vec<McqDraft> =
                        drafts.into_iter().filter(McqDraft::is_well_formed).collect();
                    if usable.len() < total {
                        warn!(dropped = total - usable.len(), "Dropped malformed questions");
                    }
                    if !usable.is_empty() {
                        metrics::record_mcqs_generated(backend, usable.len());
                        return SegmentOutcome::Generated(usable);
                    }
                    MlError::invalid_response("no well-formed questions")
                }
                Err(e) => e,
            };

            metrics::record_upstream_failure("generation", failure_kind(&error));

            if error.is_malformed() && self.config.malformed_policy == MalformedPolicy::Skip {
                warn!("Skipping segment, generated payload unusable: {}", error);
                metrics::record_segment_skipped(backend);
                SegmentOutcome::Skipped
            } else {
                warn!("Storing placeholder for segment: {}", error);
                metrics::record_sentinel(backend);
                SegmentOutcome::Failed
            }
        }
        .instrument(span)
        .await
    }
}

fn failure_kind(err: &MlError) -> &'static str {
    if err.is_malformed() {
        "malformed"
    } else {
        "unavailable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::TryStreamExt;
    use annai_firestore::{FirestoreError, FirestoreResult, MemoryStore, UpdateOutcome};
    use annai_ml_client::{MediaSource, MlResult};
    use annai_models::{McqContent, McqId, McqRecord, SegmentWindow, VideoId};
    use annai_storage::LocalUploadStore;
    use tempfile::TempDir;

    struct FixedTranscriber(MlResult<String>);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, _media: &dyn MediaSource) -> MlResult<String> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(MlError::ServiceUnavailable(e.to_string())),
            }
        }
    }

    type Script = Box<dyn Fn(usize, &str) -> MlResult<Vec<McqDraft>> + Send + Sync>;

    /// Answers from a script keyed by call number and records segment order.
    struct ScriptedGenerator {
        calls: Mutex<Vec<String>>,
        script: Script,
    }

    impl ScriptedGenerator {
        fn new(script: impl Fn(usize, &str) -> MlResult<Vec<McqDraft>> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                script: Box::new(script),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl McqGenerator for ScriptedGenerator {
        async fn generate(&self, segment: &str) -> MlResult<Vec<McqDraft>> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(segment.to_string());
                calls.len() - 1
            };
            (self.script)(call, segment)
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn draft(question: &str) -> McqDraft {
        McqDraft {
            question: question.to_string(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            answer: "a".into(),
        }
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    fn media_body(data: &'static str) -> UploadBody<'static> {
        let half = data.len() / 2;
        stream::iter(vec![
            Ok(Bytes::from_static(data[..half].as_bytes())),
            Ok(Bytes::from_static(data[half..].as_bytes())),
        ])
        .boxed()
    }

    async fn upload(pipeline: &UploadPipeline) -> IncomingUpload {
        pipeline
            .accept("lecture 1.mp4", "video/mp4", media_body("fake media"))
            .await
            .unwrap()
    }

    fn principal() -> Principal {
        Principal::new("user-1", Some("user@example.com".into()))
    }

    struct Harness {
        store: Arc<MemoryStore>,
        _dir: TempDir,
        pipeline: UploadPipeline,
    }

    async fn harness(
        transcript: MlResult<String>,
        generator: Arc<ScriptedGenerator>,
        config: PipelineConfig,
    ) -> Harness {
        let dir = TempDir::new().unwrap();
        let uploads = Arc::new(LocalUploadStore::new(dir.path()).await.unwrap());
        let store = Arc::new(MemoryStore::new());
        let pipeline = UploadPipeline::new(
            store.clone(),
            store.clone(),
            uploads,
            Arc::new(FixedTranscriber(transcript)),
            generator,
            config,
        );
        Harness {
            store,
            _dir: dir,
            pipeline,
        }
    }

    fn window(words: usize) -> PipelineConfig {
        PipelineConfig {
            segment_window: SegmentWindow::new(words).unwrap(),
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_two_segments_generated_in_order() {
        let generator = ScriptedGenerator::new(|call, _| {
            Ok(vec![
                draft(&format!("q{}-1", call)),
                draft(&format!("q{}-2", call)),
            ])
        });
        let h = harness(Ok(words(1500)), generator.clone(), PipelineConfig::default()).await;

        let summary = h.pipeline.run(principal(), upload(&h.pipeline).await).await.unwrap();

        assert_eq!(summary.video.segments.len(), 2);
        let calls = generator.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("w0 "));
        assert!(calls[1].starts_with("w750 "));

        assert_eq!(h.store.video_count().await, 1);
        assert_eq!(summary.mcq_count, 4);

        let mcqs = h.store.list_mcqs(&summary.video.id).await.unwrap();
        let tagged: Vec<(u32, &str)> = mcqs
            .iter()
            .map(|m| (m.segment_index, m.question.as_str()))
            .collect();
        assert_eq!(
            tagged,
            vec![(0, "q0-1"), (0, "q0-2"), (1, "q1-1"), (1, "q1-2")]
        );
        assert!(mcqs.iter().all(|m| m.uid.as_deref() == Some("user-1")));
        assert_eq!(summary.video.uid.as_deref(), Some("user-1"));
        assert_eq!(summary.video.email.as_deref(), Some("user@example.com"));
    }

    #[tokio::test]
    async fn test_transport_failure_isolated_to_one_segment() {
        let generator = ScriptedGenerator::new(|call, _| {
            if call == 1 {
                Err(MlError::ServiceUnavailable("connection refused".into()))
            } else {
                Ok(vec![draft(&format!("q{}", call))])
            }
        });
        let h = harness(Ok("a b c d e f".into()), generator, window(2)).await;

        let summary = h.pipeline.run(principal(), upload(&h.pipeline).await).await.unwrap();
        assert_eq!(summary.failed_segments, vec![1]);

        let mcqs = h.store.list_mcqs(&summary.video.id).await.unwrap();
        assert_eq!(mcqs.len(), 3);
        assert_eq!(mcqs[0].question, "q0");
        assert_eq!(mcqs[1].segment_index, 1);
        assert_eq!(mcqs[1].content(), McqContent::from(McqDraft::sentinel()));
        assert_eq!(mcqs[2].question, "q2");
        assert_eq!(mcqs.iter().filter(|m| m.segment_index == 1).count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_skipped_by_default() {
        let generator = ScriptedGenerator::new(|call, _| {
            if call == 0 {
                Err(MlError::invalid_response("no JSON block"))
            } else {
                Ok(vec![draft("kept")])
            }
        });
        let h = harness(Ok("a b c d".into()), generator, window(2)).await;

        let summary = h.pipeline.run(principal(), upload(&h.pipeline).await).await.unwrap();
        assert_eq!(summary.skipped_segments, vec![0]);
        assert_eq!(summary.mcq_count, 1);

        let mcqs = h.store.list_mcqs(&summary.video.id).await.unwrap();
        assert_eq!(mcqs.len(), 1);
        assert_eq!(mcqs[0].segment_index, 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_sentinel_policy() {
        let generator = ScriptedGenerator::new(|_, _| {
            Ok(vec![McqDraft {
                question: "three options".into(),
                options: vec!["a".into(), "b".into(), "c".into()],
                answer: "a".into(),
            }])
        });
        let config = PipelineConfig {
            malformed_policy: MalformedPolicy::Sentinel,
            ..window(10)
        };
        let h = harness(Ok("one two".into()), generator, config).await;

        let summary = h.pipeline.run(principal(), upload(&h.pipeline).await).await.unwrap();
        assert_eq!(summary.failed_segments, vec![0]);

        let mcqs = h.store.list_mcqs(&summary.video.id).await.unwrap();
        assert_eq!(mcqs.len(), 1);
        assert_eq!(mcqs[0].question, "Failed to generate MCQ");
    }

    #[tokio::test]
    async fn test_transcription_failure_persists_nothing() {
        let generator = ScriptedGenerator::new(|_, _| Ok(vec![draft("never")]));
        let h = harness(
            Err(MlError::ServiceUnavailable("down".into())),
            generator.clone(),
            PipelineConfig::default(),
        )
        .await;

        let err = h.pipeline.run(principal(), upload(&h.pipeline).await).await.unwrap_err();
        assert!(matches!(err, ApiError::UpstreamUnavailable(_)));
        assert_eq!(h.store.video_count().await, 0);
        assert_eq!(h.store.mcq_count().await, 0);
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_transcript_stores_video_without_questions() {
        let generator = ScriptedGenerator::new(|_, _| Ok(vec![draft("never")]));
        let h = harness(Ok("   ".into()), generator.clone(), PipelineConfig::default()).await;

        let summary = h.pipeline.run(principal(), upload(&h.pipeline).await).await.unwrap();
        assert!(summary.video.segments.is_empty());
        assert_eq!(summary.mcq_count, 0);
        assert!(generator.calls().is_empty());
        assert_eq!(h.store.video_count().await, 1);
    }

    /// Answers later segments first; results must still come back by index.
    struct SlowFirstGenerator;

    #[async_trait]
    impl McqGenerator for SlowFirstGenerator {
        async fn generate(&self, segment: &str) -> MlResult<Vec<McqDraft>> {
            let index: u64 = segment
                .trim_start_matches('s')
                .split_whitespace()
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis((4 - index) * 25)).await;
            Ok(vec![draft(segment)])
        }

        fn name(&self) -> &'static str {
            "slow-first"
        }
    }

    #[tokio::test]
    async fn test_concurrent_generation_keeps_segment_order() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let pipeline = UploadPipeline::new(
            store.clone(),
            store.clone(),
            Arc::new(LocalUploadStore::new(dir.path()).await.unwrap()),
            Arc::new(FixedTranscriber(Ok("s0 s1 s2 s3".into()))),
            Arc::new(SlowFirstGenerator),
            PipelineConfig {
                generation_concurrency: NonZeroUsize::new(4).unwrap(),
                ..window(1)
            },
        );

        let summary = pipeline.run(principal(), upload(&pipeline).await).await.unwrap();
        let mcqs = store.list_mcqs(&summary.video.id).await.unwrap();
        let order: Vec<(u32, &str)> = mcqs
            .iter()
            .map(|m| (m.segment_index, m.question.as_str()))
            .collect();
        assert_eq!(order, vec![(0, "s0"), (1, "s1"), (2, "s2"), (3, "s3")]);
    }

    /// Stores videos but refuses question inserts.
    struct BrokenMcqStore;

    #[async_trait]
    impl McqStore for BrokenMcqStore {
        async fn insert_mcqs(
            &self,
            _video_id: &VideoId,
            _uid: Option<&str>,
            _mcqs: Vec<NewMcq>,
        ) -> FirestoreResult<usize> {
            Err(FirestoreError::ServerError(503, "unavailable".into()))
        }

        async fn list_mcqs(&self, _video_id: &VideoId) -> FirestoreResult<Vec<McqRecord>> {
            Ok(Vec::new())
        }

        async fn get_mcq(&self, _id: &McqId) -> FirestoreResult<Option<McqRecord>> {
            Ok(None)
        }

        async fn replace_mcq_content(
            &self,
            _id: &McqId,
            _content: McqContent,
        ) -> FirestoreResult<UpdateOutcome> {
            Ok(UpdateOutcome::NotFound)
        }
    }

    #[tokio::test]
    async fn test_question_insert_failure_leaves_video() {
        let dir = TempDir::new().unwrap();
        let videos = Arc::new(MemoryStore::new());
        let pipeline = UploadPipeline::new(
            videos.clone(),
            Arc::new(BrokenMcqStore),
            Arc::new(LocalUploadStore::new(dir.path()).await.unwrap()),
            Arc::new(FixedTranscriber(Ok("some words".into()))),
            ScriptedGenerator::new(|_, _| Ok(vec![draft("q")])),
            PipelineConfig::default(),
        );

        let err = pipeline.run(principal(), upload(&pipeline).await).await.unwrap_err();
        assert!(matches!(err, ApiError::Firestore(_)));
        assert_eq!(videos.video_count().await, 1);
    }

    #[tokio::test]
    async fn test_detached_run_completes() {
        let generator = ScriptedGenerator::new(|_, _| Ok(vec![draft("q")]));
        let h = harness(Ok("hello world".into()), generator, PipelineConfig::default()).await;

        let incoming = upload(&h.pipeline).await;
        let summary = h
            .pipeline
            .clone()
            .run_detached(principal(), incoming)
            .await
            .unwrap();
        assert_eq!(summary.mcq_count, 1);
        assert!(summary.video.filename.ends_with("-lecture_1.mp4"));
        assert_eq!(summary.video.original_filename, "lecture 1.mp4");
    }

    /// Returns the stored media bytes as the transcript.
    struct EchoTranscriber;

    #[async_trait]
    impl Transcriber for EchoTranscriber {
        async fn transcribe(&self, media: &dyn MediaSource) -> MlResult<String> {
            let chunks: Vec<Bytes> = media
                .open()
                .await
                .map_err(|e| MlError::Media(e.to_string()))?
                .try_collect()
                .await
                .map_err(|e| MlError::Media(e.to_string()))?;
            assert_eq!(media.size(), chunks.iter().map(|c| c.len() as u64).sum::<u64>());
            Ok(String::from_utf8_lossy(&chunks.concat()).into_owned())
        }
    }

    #[tokio::test]
    async fn test_transcriber_reads_the_stored_copy() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let pipeline = UploadPipeline::new(
            store.clone(),
            store.clone(),
            Arc::new(LocalUploadStore::new(dir.path()).await.unwrap()),
            Arc::new(EchoTranscriber),
            ScriptedGenerator::new(|_, _| Ok(vec![draft("q")])),
            PipelineConfig::default(),
        );

        let incoming = pipeline
            .accept("talk.mp4", "video/mp4", media_body("spoken words from storage"))
            .await
            .unwrap();
        assert_eq!(incoming.stored.size, 25);
        assert!(dir.path().join(&incoming.stored.key).exists());

        let summary = pipeline.run(principal(), incoming).await.unwrap();
        assert_eq!(summary.video.full_transcript, "spoken words from storage");
        assert_eq!(summary.video.segments, vec!["spoken words from storage"]);
    }

    #[tokio::test]
    async fn test_broken_body_is_a_client_error() {
        let generator = ScriptedGenerator::new(|_, _| Ok(vec![draft("never")]));
        let h = harness(Ok("unused".into()), generator, PipelineConfig::default()).await;

        let broken: UploadBody<'static> = stream::iter(vec![
            Ok(Bytes::from_static(b"half a file")),
            Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "stream ended early")),
        ])
        .boxed();

        let err = h
            .pipeline
            .accept("cut.mp4", "video/mp4", broken)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(std::fs::read_dir(h._dir.path()).unwrap().count(), 0);
    }
}
