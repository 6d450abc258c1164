use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use fabula_core::{JobRecord, JobRequest};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub document_id: String,
    pub voice_id: String,
    #[serde(default)]
    pub voice_transcript: Option<String>,
}

pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<JobRecord>), ApiError> {
    let document_path = resolve_upload(&state, &request.document_id)?;
    let voice_path = resolve_upload(&state, &request.voice_id)?;

    let record = Arc::clone(&state.pipeline)
        .submit(JobRequest {
            document_path,
            voice_path,
            voice_transcript: request.voice_transcript,
        })
        .await?;
    info!(job = %record.id, "job submitted");
    Ok((StatusCode::ACCEPTED, Json(record)))
}

pub async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, ApiError> {
    match state.pipeline.store().get(&id).await {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError::not_found(format!("Unknown job: {id}"))),
    }
}

/// Upload ids are UUID-dot-extension names produced by the upload
/// endpoints; anything that could escape the uploads directory is rejected.
fn resolve_upload(state: &AppState, id: &str) -> Result<PathBuf, ApiError> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(ApiError::bad_request(format!("Invalid upload id: {id}")));
    }
    Ok(state.pipeline.config().uploads_dir().join(id))
}
