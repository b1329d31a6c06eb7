//! Upload handler.

use std::io;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::services::{IncomingUpload, UploadPipeline};
use crate::state::AppState;

/// Multipart field carrying the media file.
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub video_id: String,
    pub full_transcript: String,
    pub segments: Vec<String>,
    pub mcq_count: usize,
}

/// `POST /api/upload`: store, transcribe, segment and generate questions.
///
/// Authentication runs before the body is read. The file is streamed to
/// storage as it arrives.
pub async fn upload_video(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let mut multipart = multipart.map_err(|e| {
        warn!("Upload without a multipart body: {}", e);
        ApiError::bad_request("No file uploaded")
    })?;

    let pipeline = state.upload_pipeline();
    let upload = accept_file_field(&pipeline, &mut multipart)
        .await?
        .ok_or_else(|| ApiError::bad_request("No file uploaded"))?;

    info!(
        uid = %principal.uid,
        filename = %upload.original_name,
        bytes = upload.stored.size,
        "Upload received"
    );

    let summary = pipeline.run_detached(principal, upload).await?;

    Ok(Json(UploadResponse {
        message: "Upload and transcription successful".to_string(),
        video_id: summary.video.id.to_string(),
        full_transcript: summary.video.full_transcript,
        segments: summary.video.segments,
        mcq_count: summary.mcq_count,
    }))
}

/// Store the first `file` field of the form; other fields are ignored.
async fn accept_file_field(
    pipeline: &UploadPipeline,
    multipart: &mut Multipart,
) -> ApiResult<Option<IncomingUpload>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed upload: {}", e.body_text())))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = field
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.body_text()))
            .boxed();

        return pipeline
            .accept(&original_name, &content_type, body)
            .await
            .map(Some);
    }

    Ok(None)
}
