use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Permission;

/// The part of a user profile other users are allowed to see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOut {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub notes_count: i64,
    pub deleted_notes_count: i64,
    pub attachments_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentOut {
    pub id: Uuid,
    /// `None` once the owning note has been hard-deleted.
    pub note_id: Option<Uuid>,
    pub filename: String,
    pub mime_type: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteShareOut {
    pub id: Uuid,
    pub permission: Permission,
    /// Stored, not enforced: readers compare against the current time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(rename = "with", skip_serializing_if = "Option::is_none")]
    pub shared_with: Option<PublicUser>,
    pub created_at: DateTime<Utc>,
}

/// Note content is opaque to the server; `encrypted` only records what the
/// client did with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteOut {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author: PublicUser,
    pub encrypted: bool,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub attachments: Vec<AttachmentOut>,
    pub shares: Vec<NoteShareOut>,
}

/// A note seen through a share, annotated with the recipient's access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedNoteOut {
    #[serde(flatten)]
    pub note: NoteOut,
    pub permission: Permission,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}
