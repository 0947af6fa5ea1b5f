use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use vault_types::api::{Claims, NoteShareResponse, ShareToUserRequest, SharedNotesResponse};
use vault_types::models::{NoteOut, NoteShareOut, SharedNoteOut};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::notes::PageQuery;

/// Grant or replace access, answering with the note's full share list.
pub async fn share_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(note_id): Path<Uuid>,
    Json(req): Json<ShareToUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let shared = blocking(move || {
        db.share_note(claims.sub, note_id, &req.shared_with, &req.permission, req.expires)?;
        db.list_shares(claims.sub, note_id)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(NoteShareResponse {
            shared: shared.iter().map(NoteShareOut::from).collect(),
        }),
    ))
}

pub async fn list_shares(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(note_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let shared = blocking(move || db.list_shares(claims.sub, note_id)).await?;
    Ok(Json(NoteShareResponse {
        shared: shared.iter().map(NoteShareOut::from).collect(),
    }))
}

/// Succeeds whether or not a share existed.
pub async fn revoke_share(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((note_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    blocking(move || db.revoke_share(claims.sub, note_id, user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn shared_with_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page();
    let db = state.db.clone();
    let (records, total) = blocking(move || db.list_shared_with(claims.sub, page, Utc::now())).await?;

    Ok(Json(SharedNotesResponse {
        notes: records
            .iter()
            .map(|s| SharedNoteOut {
                note: NoteOut::from(&s.record),
                permission: s.permission,
                expires: s.expires,
            })
            .collect(),
        total,
    }))
}
