use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use vault_db::attachments::{AttachmentFilter, SortOrder};
use vault_db::notes::{Page, Visibility};
use vault_storage::PRESIGN_TTL;
use vault_types::api::{
    AttachmentRef, AttachmentsResponse, Claims, PresignDownloadResponse, PresignUploadRequest,
    PresignUploadResponse,
};
use vault_types::keys::{attachment_key, is_valid_filename};
use vault_types::models::{AttachmentOut, NoteOut};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct AttachmentsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub deleted: bool,
    pub mime_type: Option<String>,
    pub note_id: Option<Uuid>,
    pub sort: Option<String>,
}

/// Presigned PUT for `attachments/{noteId}/{filename}`. No row exists until
/// the upload lands and ingestion registers it.
pub async fn presign_upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(note_id): Path<Uuid>,
    Json(req): Json<PresignUploadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !is_valid_filename(&req.filename) {
        return Err(ApiError::validation("filename must be a single path segment"));
    }
    if req.content_type.trim().is_empty() {
        return Err(ApiError::validation("content_type is required"));
    }

    let db = state.db.clone();
    blocking(move || db.find_note(claims.sub, note_id, Visibility::Live))
        .await?
        .ok_or_else(|| ApiError::NotFound("note not found".into()))?;

    let key = attachment_key(note_id, &req.filename);
    let url = state.store.presigned_put_url(&key, &req.content_type, PRESIGN_TTL)?;
    Ok(Json(PresignUploadResponse { url, key }))
}

pub async fn download_url(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((note_id, attachment_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let attachment = blocking(move || db.find_attachment(claims.sub, note_id, attachment_id)).await?;

    let url = state.store.presigned_get_url(&attachment.object_key, PRESIGN_TTL)?;
    Ok(Json(PresignDownloadResponse { url }))
}

/// Deletes the stored object first, then the row, so a failed object delete
/// leaves the attachment visible and retryable.
pub async fn delete_attachment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((note_id, attachment_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let attachment = blocking(move || db.find_attachment(claims.sub, note_id, attachment_id)).await?;

    state.store.delete_object(&state.bucket, &attachment.object_key).await?;

    let db = state.db.clone();
    blocking(move || db.delete_attachment(claims.sub, note_id, attachment_id)).await?;
    info!(attachment_id = %attachment_id, key = %attachment.object_key, "attachment deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_attachments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<AttachmentsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let sort = match query.sort.as_deref() {
        None | Some("desc") => SortOrder::Desc,
        Some("asc") => SortOrder::Asc,
        Some(other) => return Err(ApiError::validation(format!("invalid sort: {other}"))),
    };
    let filter = AttachmentFilter {
        deleted: query.deleted,
        mime_type: query.mime_type.filter(|m| !m.is_empty()),
        note_id: query.note_id,
        sort,
    };
    let page = Page::new(query.page, query.limit);

    let db = state.db.clone();
    let (entries, total) = blocking(move || db.list_attachments(claims.sub, &filter, page)).await?;
    Ok(Json(AttachmentsResponse {
        attachments: entries
            .iter()
            .map(|e| AttachmentRef {
                attachment: AttachmentOut::from(&e.attachment),
                note: NoteOut::from(&e.note),
            })
            .collect(),
        total,
    }))
}
