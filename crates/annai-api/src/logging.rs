//! Structured logging for upload pipeline runs.

use tracing::{error, info, warn, Span};

/// Logs pipeline stages with the upload's context attached.
#[derive(Debug, Clone)]
pub struct PipelineLogger {
    upload_id: String,
    uid: String,
}

impl PipelineLogger {
    /// `upload_id` identifies the run before the video has an ID.
    pub fn new(upload_id: &str, uid: &str) -> Self {
        Self {
            upload_id: upload_id.to_string(),
            uid: uid.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(upload_id = %self.upload_id, uid = %self.uid, "Pipeline started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(upload_id = %self.upload_id, uid = %self.uid, "Pipeline progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(upload_id = %self.upload_id, uid = %self.uid, "Pipeline warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(upload_id = %self.upload_id, uid = %self.uid, "Pipeline error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(upload_id = %self.upload_id, uid = %self.uid, "Pipeline completed: {}", message);
    }

    /// Span covering one pipeline run.
    pub fn create_span(&self, filename: &str) -> Span {
        tracing::info_span!(
            "upload_pipeline",
            upload_id = %self.upload_id,
            uid = %self.uid,
            filename = %filename,
            video_id = tracing::field::Empty
        )
    }
}
