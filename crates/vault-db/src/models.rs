//! Row types. These map directly to SQLite rows and stay distinct from the
//! vault-types API models so the DB layer can evolve on its own.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use vault_types::Permission;
use vault_types::models::{AttachmentOut, NoteOut, NoteShareOut, PublicUser, UserOut};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub federated_uid: Option<String>,
    pub password: Option<String>,
    pub avatar_url: Option<String>,
    pub notes_count: i64,
    pub deleted_notes_count: i64,
    pub attachments_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NoteRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub encrypted: bool,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRow {
    pub id: Uuid,
    pub note_id: Option<Uuid>,
    pub object_key: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

/// A share joined with the recipient's public profile.
#[derive(Debug, Clone)]
pub struct NoteShareRow {
    pub id: Uuid,
    pub note_id: Uuid,
    pub shared_with: PublicUser,
    pub permission: Permission,
    pub expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NoteShareRow {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }
}

/// A note together with its author and the relations a caller may see.
#[derive(Debug, Clone)]
pub struct NoteRecord {
    pub note: NoteRow,
    pub author: PublicUser,
    pub attachments: Vec<AttachmentRow>,
    pub shares: Vec<NoteShareRow>,
}

/// A note reached through a share addressed to the caller.
#[derive(Debug, Clone)]
pub struct SharedNoteRecord {
    pub record: NoteRecord,
    pub permission: Permission,
    pub expires: Option<DateTime<Utc>>,
}

// -- Conversions to API models --

impl UserRow {
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }

    pub fn to_out(&self) -> UserOut {
        UserOut {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
            notes_count: self.notes_count,
            deleted_notes_count: self.deleted_notes_count,
            attachments_count: self.attachments_count,
            created_at: self.created_at,
        }
    }
}

impl From<&AttachmentRow> for AttachmentOut {
    fn from(a: &AttachmentRow) -> Self {
        AttachmentOut {
            id: a.id,
            note_id: a.note_id,
            filename: a.file_name.clone(),
            mime_type: a.mime_type.clone(),
            size: a.size,
            created_at: a.created_at,
        }
    }
}

impl From<&NoteShareRow> for NoteShareOut {
    fn from(s: &NoteShareRow) -> Self {
        NoteShareOut {
            id: s.id,
            permission: s.permission,
            expires: s.expires,
            shared_with: Some(s.shared_with.clone()),
            created_at: s.created_at,
        }
    }
}

impl From<&NoteRecord> for NoteOut {
    fn from(r: &NoteRecord) -> Self {
        NoteOut {
            id: r.note.id,
            title: r.note.title.clone(),
            content: r.note.content.clone(),
            author: r.author.clone(),
            encrypted: r.note.encrypted,
            archived: r.note.archived,
            created_at: r.note.created_at,
            updated_at: r.note.updated_at,
            deleted_at: r.note.deleted_at,
            attachments: r.attachments.iter().map(AttachmentOut::from).collect(),
            shares: r.shares.iter().map(NoteShareOut::from).collect(),
        }
    }
}

// -- Column readers --

pub(crate) fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| {
        Uuid::parse_str(&r)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn permission_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Permission> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
