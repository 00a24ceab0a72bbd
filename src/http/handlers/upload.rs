//! Upload handlers.
//!
//! Uploads arrive as `multipart/form-data` with the file in the `file`
//! field and land in the blob store.

use super::super::{AppError, SharedState};
use super::file::FILE_CACHE_CONTROL;
use crate::upload::{IncomingFile, UploadedFile};
use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Query, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

/// POST /upload, POST /api/r2/upload - Store one file.
pub(crate) async fn upload(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<UploadedFile>>, AppError> {
    // Reject before reading the body when there is nowhere to put it.
    state.backends.upload_target()?;

    let mut incoming = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to parse multipart: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("blob").to_string();
        let content_type = field.content_type().map(str::to_string);
        let body = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read file data: {e}")))?;

        incoming = Some(IncomingFile {
            file_name,
            content_type,
            body,
        });
        break;
    }

    let file = incoming.ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;
    let uploaded = state.uploads.upload(file).await?;
    Ok(Json(vec![uploaded]))
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawQuery {
    id: Option<String>,
}

/// GET /api/r2/upload?id= - Return a stored blob without gating.
pub(crate) async fn get_raw(
    State(state): State<SharedState>,
    Query(query): Query<RawQuery>,
) -> Result<Response, AppError> {
    let id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("File ID required".to_string()))?;

    let object = state.uploads.fetch_raw(&id).await?;
    let disposition = object
        .metadata_str("fileName")
        .map(super::file::inline_disposition);
    let content_type = object
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut response = (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, FILE_CACHE_CONTROL.to_string()),
        ],
        Body::from(object.body),
    )
        .into_response();

    if let Some(value) = disposition.and_then(|d| d.parse::<HeaderValue>().ok()) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}
