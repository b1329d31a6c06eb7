//! Video read handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use annai_models::VideoId;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoTranscriptResponse {
    pub segments: Vec<String>,
    pub full_transcript: String,
}

/// `GET /api/videos/:id`
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<VideoTranscriptResponse>> {
    let video = state
        .videos
        .get_video(&VideoId::from(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;

    Ok(Json(VideoTranscriptResponse {
        segments: video.segments,
        full_transcript: video.full_transcript,
    }))
}
