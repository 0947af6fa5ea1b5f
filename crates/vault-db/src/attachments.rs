//! Attachment rows. Rows are only ever created by ingestion; clients read
//! and delete them through their owning note.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};
use tracing::debug;
use uuid::Uuid;

use crate::error::is_foreign_key_violation;
use crate::models::{AttachmentRow, NoteRecord, opt_uuid_at, uuid_at};
use crate::notes::{NOTE_COLUMNS, Page, Visibility, hydrate, query_notes};
use crate::{Database, Result, StoreError, placeholders};

pub(crate) const ATTACHMENT_COLUMNS: &str =
    "a.id, a.note_id, a.object_key, a.file_name, a.mime_type, a.size, a.created_at";

pub struct NewAttachment<'a> {
    pub note_id: Uuid,
    /// Source object key; unique, so redelivered events are recognised.
    pub object_key: &'a str,
    pub file_name: &'a str,
    pub mime_type: &'a str,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Created(AttachmentRow),
    /// The object key was already registered; the existing row is returned
    /// untouched.
    Duplicate(AttachmentRow),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttachmentFilter {
    /// Read attachments of soft-deleted notes instead of live ones.
    pub deleted: bool,
    /// Matches on prefix, so `image/` selects every image type.
    pub mime_type: Option<String>,
    pub note_id: Option<Uuid>,
    pub sort: SortOrder,
}

/// One entry of the attachment listing: the row and the note it hangs off.
#[derive(Debug, Clone)]
pub struct AttachmentWithNote {
    pub attachment: AttachmentRow,
    pub note: NoteRecord,
}

impl Database {
    /// Insert an attachment for an uploaded object. The note's existence is
    /// not checked up front: the foreign key decides, and a missing note
    /// surfaces as `NotFound("note")`.
    pub fn register_attachment(&self, new: NewAttachment<'_>) -> Result<Registration> {
        let id = Uuid::new_v4();

        self.with_conn(|conn| {
            let inserted = conn
                .execute(
                    "INSERT INTO attachments (id, note_id, object_key, file_name, mime_type, size, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(object_key) DO NOTHING",
                    rusqlite::params![
                        id.to_string(),
                        new.note_id.to_string(),
                        new.object_key,
                        new.file_name,
                        new.mime_type,
                        new.size,
                        Utc::now()
                    ],
                )
                .map_err(|e| {
                    if is_foreign_key_violation(&e) {
                        StoreError::NotFound("note")
                    } else {
                        StoreError::Database(e)
                    }
                })?;

            let row = query_by_key(conn, new.object_key)?.ok_or(StoreError::NotFound("attachment"))?;
            if inserted == 0 {
                debug!(key = new.object_key, attachment_id = %row.id, "attachment already registered");
                Ok(Registration::Duplicate(row))
            } else {
                Ok(Registration::Created(row))
            }
        })
    }

    /// An attachment on a live note the caller owns.
    pub fn find_attachment(&self, owner: Uuid, note_id: Uuid, attachment_id: Uuid) -> Result<AttachmentRow> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ATTACHMENT_COLUMNS} FROM attachments a JOIN notes n ON n.id = a.note_id
                  WHERE a.id = ?1 AND n.id = ?2 AND n.user_id = ?3 AND {}",
                Visibility::Live.predicate()
            );
            conn.query_row(
                &sql,
                [attachment_id.to_string(), note_id.to_string(), owner.to_string()],
                map_attachment,
            )
            .optional()?
            .ok_or(StoreError::NotFound("attachment"))
        })
    }

    /// Remove the row only. Callers delete the backing object first.
    pub fn delete_attachment(&self, owner: Uuid, note_id: Uuid, attachment_id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM attachments
                  WHERE id = ?1
                    AND note_id IN (SELECT id FROM notes WHERE id = ?2 AND user_id = ?3 AND deleted_at IS NULL)",
                [attachment_id.to_string(), note_id.to_string(), owner.to_string()],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound("attachment"));
            }
            Ok(())
        })
    }

    /// Attachments across the caller's notes. Detached rows (note hard
    /// deleted) are never listed.
    pub fn list_attachments(
        &self,
        owner: Uuid,
        filter: &AttachmentFilter,
        page: Page,
    ) -> Result<(Vec<AttachmentWithNote>, i64)> {
        self.with_conn(|conn| {
            let visibility = if filter.deleted {
                Visibility::Deleted
            } else {
                Visibility::Live
            };
            let mut clause = format!(
                "FROM attachments a JOIN notes n ON n.id = a.note_id WHERE n.user_id = ?1 AND {}",
                visibility.predicate()
            );
            let mut params: Vec<Value> = vec![Value::Text(owner.to_string())];
            if let Some(mime) = &filter.mime_type {
                params.push(Value::Text(mime.clone()));
                let i = params.len();
                clause.push_str(&format!(" AND substr(a.mime_type, 1, length(?{i})) = ?{i}"));
            }
            if let Some(note_id) = filter.note_id {
                params.push(Value::Text(note_id.to_string()));
                clause.push_str(&format!(" AND a.note_id = ?{}", params.len()));
            }

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) {clause}"),
                params_from_iter(params.iter()),
                |r| r.get(0),
            )?;

            params.push(Value::Integer(page.limit as i64));
            params.push(Value::Integer(page.offset()));
            let sql = format!(
                "SELECT {ATTACHMENT_COLUMNS} {clause} ORDER BY a.created_at {order}, a.rowid {order} LIMIT ?{} OFFSET ?{}",
                params.len() - 1,
                params.len(),
                order = filter.sort.sql(),
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params.iter()), map_attachment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let notes = notes_by_id(conn, &rows)?;
            let entries = rows
                .into_iter()
                .filter_map(|attachment| {
                    let note = notes.get(&attachment.note_id?)?.clone();
                    Some(AttachmentWithNote { attachment, note })
                })
                .collect();
            Ok((entries, total))
        })
    }
}

fn notes_by_id(conn: &Connection, rows: &[AttachmentRow]) -> Result<HashMap<Uuid, NoteRecord>> {
    let mut ids: Vec<Uuid> = rows.iter().filter_map(|a| a.note_id).collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let sql = format!(
        "SELECT {NOTE_COLUMNS} FROM notes n WHERE n.id IN ({})",
        placeholders(ids.len())
    );
    let notes = query_notes(conn, &sql, params_from_iter(ids.iter().map(|id| id.to_string())))?;
    Ok(hydrate(conn, notes, true)?
        .into_iter()
        .map(|record| (record.note.id, record))
        .collect())
}

fn query_by_key(conn: &Connection, object_key: &str) -> Result<Option<AttachmentRow>> {
    let sql = format!("SELECT {ATTACHMENT_COLUMNS} FROM attachments a WHERE a.object_key = ?1");
    Ok(conn.query_row(&sql, [object_key], map_attachment).optional()?)
}

pub(crate) fn map_attachment(row: &Row<'_>) -> rusqlite::Result<AttachmentRow> {
    Ok(AttachmentRow {
        id: uuid_at(row, 0)?,
        note_id: opt_uuid_at(row, 1)?,
        object_key: row.get(2)?,
        file_name: row.get(3)?,
        mime_type: row.get(4)?,
        size: row.get(5)?,
        created_at: row.get(6)?,
    })
}
