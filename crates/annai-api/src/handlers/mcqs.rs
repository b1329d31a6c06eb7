//! Question list and edit handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};
use validator::Validate;

use annai_models::{McqContent, McqId, McqRecord, VideoId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct McqListResponse {
    pub mcqs: Vec<McqRecord>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// `GET /api/mcqs/:videoId`: the video's questions in insertion order.
///
/// An unknown video yields an empty list.
pub async fn list_mcqs(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<McqListResponse>> {
    let mcqs = state.mcqs.list_mcqs(&VideoId::from(video_id)).await?;
    Ok(Json(McqListResponse { mcqs }))
}

/// `PATCH /api/mcqs/:id`: replace question, options and answer.
pub async fn update_mcq(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<McqContent>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(content) = body.map_err(|e| {
        warn!(mcq_id = %id, "Rejected MCQ update body: {}", e.body_text());
        ApiError::bad_request("Invalid MCQ body")
    })?;

    content
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let id = McqId::from(id);
    let outcome = state.mcqs.replace_mcq_content(&id, content).await?;

    if outcome.modified() {
        info!(mcq_id = %id, "MCQ updated");
        Ok(Json(MessageResponse {
            message: "MCQ updated".to_string(),
        }))
    } else {
        Err(ApiError::not_found("MCQ not found or no change"))
    }
}
