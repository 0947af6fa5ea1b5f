use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use vault_db::notes::{DeleteMode, NewNote, NoteChanges, NoteFilter, Page};
use vault_types::api::{Claims, NoteIn, NotesResponse};
use vault_types::models::NoteOut;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::new(self.page, self.limit)
    }
}

#[derive(Debug, Deserialize)]
pub struct NotesQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub archived: Option<bool>,
    pub encrypted: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub hard: bool,
}

pub async fn list_notes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<NotesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = NoteFilter {
        archived: query.archived,
        encrypted: query.encrypted,
    };
    let page = Page::new(query.page, query.limit);

    let db = state.db.clone();
    let (records, total) = blocking(move || db.list_notes(claims.sub, filter, page)).await?;
    Ok(Json(NotesResponse {
        notes: records.iter().map(NoteOut::from).collect(),
        total,
    }))
}

pub async fn create_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<NoteIn>,
) -> Result<impl IntoResponse, ApiError> {
    let new = NewNote {
        title: req.title,
        content: req.content,
        encrypted: req.encrypted.unwrap_or(false),
        archived: req.archived.unwrap_or(false),
    };

    let db = state.db.clone();
    let record = blocking(move || db.create_note(claims.sub, new)).await?;
    Ok((StatusCode::CREATED, Json(NoteOut::from(&record))))
}

pub async fn get_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(note_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let record = blocking(move || db.get_note(claims.sub, note_id)).await?;
    Ok(Json(NoteOut::from(&record)))
}

pub async fn edit_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(note_id): Path<Uuid>,
    Json(req): Json<NoteIn>,
) -> Result<impl IntoResponse, ApiError> {
    let changes = NoteChanges {
        title: req.title,
        content: req.content,
        encrypted: req.encrypted,
        archived: req.archived,
    };

    let db = state.db.clone();
    let record = blocking(move || db.edit_note(claims.sub, note_id, changes)).await?;
    Ok(Json(NoteOut::from(&record)))
}

/// `?hard=true` removes the row instead of marking it deleted.
pub async fn delete_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(note_id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mode = if query.hard {
        DeleteMode::Hard
    } else {
        DeleteMode::Soft
    };

    let db = state.db.clone();
    blocking(move || db.delete_note(claims.sub, note_id, mode)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_deleted_notes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page();
    let db = state.db.clone();
    let (records, total) = blocking(move || db.list_deleted_notes(claims.sub, page)).await?;
    Ok(Json(NotesResponse {
        notes: records.iter().map(NoteOut::from).collect(),
        total,
    }))
}

pub async fn restore_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(note_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let record = blocking(move || db.restore_note(claims.sub, note_id)).await?;
    Ok(Json(NoteOut::from(&record)))
}
