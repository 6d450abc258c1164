use std::path::Path;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use fabula_core::config;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: String,
    pub filename: String,
    pub bytes: usize,
}

pub async fn upload_document(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let max_mb = state.server_config.max_document_mb;
    store_upload(&state, multipart, config::DOCUMENT_EXTENSIONS, max_mb).await
}

pub async fn upload_voice(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let max_mb = state.server_config.max_voice_mb;
    store_upload(&state, multipart, config::VOICE_EXTENSIONS, max_mb).await
}

/// Persist the `file` part of a multipart upload under a fresh UUID name,
/// keeping the original extension.
async fn store_upload(
    state: &AppState,
    mut multipart: Multipart,
    allowed: &[&str],
    max_mb: usize,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let max_bytes = max_mb * 1024 * 1024;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::bad_request(format!("Failed reading multipart field: {e}"))
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(|f| f.to_string())
            .ok_or_else(|| ApiError::bad_request("Multipart file field needs a filename"))?;
        let extension = Path::new(&filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| {
                ApiError::bad_request(format!("Filename has no extension: {filename}"))
            })?;
        if !allowed.contains(&extension.as_str()) {
            return Err(ApiError::bad_request(format!(
                "Unsupported file type '{extension}', expected one of: {}",
                allowed.join(", ")
            )));
        }

        let data = field.bytes().await.map_err(|e| {
            ApiError::bad_request(format!("Failed reading upload body: {e}"))
        })?;
        if data.is_empty() {
            return Err(ApiError::bad_request("Uploaded file is empty"));
        }
        if data.len() > max_bytes {
            return Err(ApiError::bad_request(format!(
                "Upload exceeds the {max_mb} MB limit"
            )));
        }

        let id = format!("{}.{extension}", Uuid::new_v4());
        let path = state.pipeline.config().uploads_dir().join(&id);
        tokio::fs::write(&path, &data).await.map_err(|e| {
            ApiError::internal(format!("Failed to store upload: {e}"))
        })?;
        info!(upload = %id, bytes = data.len(), "stored upload");

        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                id,
                filename,
                bytes: data.len(),
            }),
        ));
    }

    Err(ApiError::bad_request("Missing multipart field 'file'"))
}
