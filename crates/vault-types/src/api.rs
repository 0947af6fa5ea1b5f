use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AttachmentOut, NoteOut, NoteShareOut, SharedNoteOut, UserOut};

// -- JWT Claims --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub typ: TokenKind,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub refresh: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub session: Session,
    pub user: UserOut,
}

// -- Notes --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoteIn {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub encrypted: Option<bool>,
    #[serde(default)]
    pub archived: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotesResponse {
    pub notes: Vec<NoteOut>,
    pub total: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SharedNotesResponse {
    pub notes: Vec<SharedNoteOut>,
    pub total: i64,
}

// -- Attachments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresignUploadRequest {
    pub filename: String,
    pub content_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PresignUploadResponse {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PresignDownloadResponse {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub attachment: AttachmentOut,
    pub note: NoteOut,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttachmentsResponse {
    pub attachments: Vec<AttachmentRef>,
    pub total: i64,
}

// -- Shares --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShareToUserRequest {
    /// User id, email or username, tried in that order.
    pub shared_with: String,
    pub permission: String,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NoteShareResponse {
    pub shared: Vec<NoteShareOut>,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
