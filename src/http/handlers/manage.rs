//! File management handlers.

use super::super::{AppError, SharedState};
use crate::keys::FileCategory;
use crate::manage::{DeleteReport, FilePage, ListQuery};
use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    #[serde(rename = "type")]
    category: Option<String>,
    limit: Option<usize>,
    cursor: Option<String>,
}

/// GET /api/manage/list - Page through indexed files.
pub(crate) async fn list(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<FilePage>, AppError> {
    let category = match params.category.as_deref() {
        None | Some("") | Some("all") => None,
        Some(name) => Some(
            FileCategory::parse(name)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown file type: {name}")))?,
        ),
    };

    let page = state
        .files
        .list(ListQuery {
            category,
            limit: params.limit,
            cursor: params.cursor.filter(|c| !c.is_empty()),
        })
        .await?;
    Ok(Json(page))
}

/// DELETE /api/manage/delete/{id} - Remove a file and its records.
pub(crate) async fn delete(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteReport>, AppError> {
    Ok(Json(state.files.delete(&id).await?))
}
