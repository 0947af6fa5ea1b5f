//! Note lifecycle: create, edit, list, soft delete, restore, hard delete.
//!
//! Every lookup is scoped by note id *and* owner id. A note owned by someone
//! else is reported as `NotFound`, exactly like a note that does not exist.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Params, Row, params_from_iter};
use tracing::debug;
use uuid::Uuid;

use crate::attachments::map_attachment;
use crate::models::{NoteRecord, NoteRow, uuid_at};
use crate::shares::{SHARE_SELECT, map_share};
use crate::{Database, Result, StoreError, placeholders};
use vault_types::models::PublicUser;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

pub(crate) const NOTE_COLUMNS: &str =
    "n.id, n.user_id, n.title, n.content, n.encrypted, n.archived, n.created_at, n.updated_at, n.deleted_at";

/// Which side of the soft-delete marker a query reads. Passed explicitly to
/// every lookup so live and deleted reads cannot leak into each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Live,
    Deleted,
    Any,
}

impl Visibility {
    pub(crate) fn predicate(self) -> &'static str {
        match self {
            Visibility::Live => "n.deleted_at IS NULL",
            Visibility::Deleted => "n.deleted_at IS NOT NULL",
            Visibility::Any => "1 = 1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    Soft,
    Hard,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Widened so a huge `page` from a query string cannot overflow.
    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoteFilter {
    pub archived: Option<bool>,
    pub encrypted: Option<bool>,
}

impl NoteFilter {
    fn is_empty(&self) -> bool {
        self.archived.is_none() && self.encrypted.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    pub encrypted: bool,
    pub archived: bool,
}

/// Title and content are replaced; flags are kept unless given.
#[derive(Debug, Clone)]
pub struct NoteChanges {
    pub title: String,
    pub content: String,
    pub encrypted: Option<bool>,
    pub archived: Option<bool>,
}

fn validate_text(title: &str, content: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(StoreError::validation("title must not be empty"));
    }
    if content.trim().is_empty() {
        return Err(StoreError::validation("content must not be empty"));
    }
    Ok(())
}

impl Database {
    pub fn create_note(&self, owner: Uuid, new: NewNote) -> Result<NoteRecord> {
        validate_text(&new.title, &new.content)?;
        let id = Uuid::new_v4();
        let now = Utc::now();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notes (id, user_id, title, content, encrypted, archived, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                rusqlite::params![
                    id.to_string(),
                    owner.to_string(),
                    new.title,
                    new.content,
                    new.encrypted,
                    new.archived,
                    now
                ],
            )
            .map_err(|e| {
                if crate::error::is_foreign_key_violation(&e) {
                    StoreError::NotFound("user")
                } else {
                    StoreError::Database(e)
                }
            })?;
            debug!(note_id = %id, owner = %owner, "note created");

            load_record(conn, owner, id, Visibility::Live)
        })
    }

    pub fn edit_note(&self, owner: Uuid, note_id: Uuid, changes: NoteChanges) -> Result<NoteRecord> {
        validate_text(&changes.title, &changes.content)?;

        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE notes
                    SET title = ?1,
                        content = ?2,
                        encrypted = COALESCE(?3, encrypted),
                        archived = COALESCE(?4, archived),
                        updated_at = ?5
                  WHERE id = ?6 AND user_id = ?7 AND deleted_at IS NULL",
                rusqlite::params![
                    changes.title,
                    changes.content,
                    changes.encrypted,
                    changes.archived,
                    Utc::now(),
                    note_id.to_string(),
                    owner.to_string()
                ],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound("note"));
            }

            load_record(conn, owner, note_id, Visibility::Live)
        })
    }

    /// Live notes, newest first, with attachments and shares, plus a total.
    pub fn list_notes(&self, owner: Uuid, filter: NoteFilter, page: Page) -> Result<(Vec<NoteRecord>, i64)> {
        self.with_conn(|conn| {
            let mut sql = format!(
                "SELECT {NOTE_COLUMNS} FROM notes n WHERE n.user_id = ?1 AND {}",
                Visibility::Live.predicate()
            );
            let mut params: Vec<Value> = vec![Value::Text(owner.to_string())];
            if let Some(archived) = filter.archived {
                params.push(Value::Integer(archived as i64));
                sql.push_str(&format!(" AND n.archived = ?{}", params.len()));
            }
            if let Some(encrypted) = filter.encrypted {
                params.push(Value::Integer(encrypted as i64));
                sql.push_str(&format!(" AND n.encrypted = ?{}", params.len()));
            }

            let total = if filter.is_empty() {
                owner_counter(conn, owner, "notes_count")?
            } else {
                let count_sql = sql.replacen(NOTE_COLUMNS, "COUNT(*)", 1);
                conn.query_row(&count_sql, params_from_iter(params.iter()), |r| r.get(0))?
            };

            params.push(Value::Integer(page.limit as i64));
            params.push(Value::Integer(page.offset()));
            sql.push_str(&format!(
                " ORDER BY n.created_at DESC, n.rowid DESC LIMIT ?{} OFFSET ?{}",
                params.len() - 1,
                params.len()
            ));

            let rows = query_notes(conn, &sql, params_from_iter(params))?;
            Ok((hydrate(conn, rows, true)?, total))
        })
    }

    pub fn get_note(&self, owner: Uuid, note_id: Uuid) -> Result<NoteRecord> {
        self.with_conn(|conn| load_record(conn, owner, note_id, Visibility::Live))
    }

    /// The bare row, without relations, on the requested side of the
    /// soft-delete marker.
    pub fn find_note(&self, owner: Uuid, note_id: Uuid, visibility: Visibility) -> Result<Option<NoteRow>> {
        self.with_conn(|conn| find_note(conn, owner, note_id, visibility))
    }

    /// Soft delete sets `deleted_at` on a live note. Hard delete removes the
    /// row whatever its state; attachments are detached, shares go with it.
    pub fn delete_note(&self, owner: Uuid, note_id: Uuid, mode: DeleteMode) -> Result<()> {
        self.with_conn(|conn| {
            let n = match mode {
                DeleteMode::Soft => conn.execute(
                    "UPDATE notes SET deleted_at = ?1
                      WHERE id = ?2 AND user_id = ?3 AND deleted_at IS NULL",
                    rusqlite::params![Utc::now(), note_id.to_string(), owner.to_string()],
                )?,
                DeleteMode::Hard => conn.execute(
                    "DELETE FROM notes WHERE id = ?1 AND user_id = ?2",
                    rusqlite::params![note_id.to_string(), owner.to_string()],
                )?,
            };
            if n == 0 {
                return Err(StoreError::NotFound("note"));
            }
            debug!(note_id = %note_id, owner = %owner, ?mode, "note deleted");
            Ok(())
        })
    }

    /// Soft-deleted notes, most recently deleted first.
    pub fn list_deleted_notes(&self, owner: Uuid, page: Page) -> Result<(Vec<NoteRecord>, i64)> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {NOTE_COLUMNS} FROM notes n
                  WHERE n.user_id = ?1 AND {}
                  ORDER BY n.deleted_at DESC, n.rowid DESC
                  LIMIT ?2 OFFSET ?3",
                Visibility::Deleted.predicate()
            );
            let rows = query_notes(
                conn,
                &sql,
                rusqlite::params![owner.to_string(), page.limit, page.offset()],
            )?;
            let total = owner_counter(conn, owner, "deleted_notes_count")?;
            Ok((hydrate(conn, rows, true)?, total))
        })
    }

    pub fn restore_note(&self, owner: Uuid, note_id: Uuid) -> Result<NoteRecord> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE notes SET deleted_at = NULL
                  WHERE id = ?1 AND user_id = ?2 AND deleted_at IS NOT NULL",
                rusqlite::params![note_id.to_string(), owner.to_string()],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound("note"));
            }
            load_record(conn, owner, note_id, Visibility::Live)
        })
    }
}

fn owner_counter(conn: &Connection, owner: Uuid, column: &str) -> Result<i64> {
    let sql = format!("SELECT {column} FROM users WHERE id = ?1");
    let count = conn
        .query_row(&sql, [owner.to_string()], |r| r.get(0))
        .optional()?;
    Ok(count.unwrap_or(0))
}

pub(crate) fn find_note(
    conn: &Connection,
    owner: Uuid,
    note_id: Uuid,
    visibility: Visibility,
) -> Result<Option<NoteRow>> {
    let sql = format!(
        "SELECT {NOTE_COLUMNS} FROM notes n WHERE n.id = ?1 AND n.user_id = ?2 AND {}",
        visibility.predicate()
    );
    let row = conn
        .query_row(&sql, [note_id.to_string(), owner.to_string()], map_note)
        .optional()?;
    Ok(row)
}

fn load_record(conn: &Connection, owner: Uuid, note_id: Uuid, visibility: Visibility) -> Result<NoteRecord> {
    let row = find_note(conn, owner, note_id, visibility)?.ok_or(StoreError::NotFound("note"))?;
    hydrate(conn, vec![row], true)?
        .pop()
        .ok_or(StoreError::NotFound("note"))
}

pub(crate) fn query_notes<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<NoteRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_note)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn map_note(row: &Row<'_>) -> rusqlite::Result<NoteRow> {
    Ok(NoteRow {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        encrypted: row.get(4)?,
        archived: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        deleted_at: row.get(8)?,
    })
}

/// Attach authors, attachments and (for owners) shares to a page of notes
/// with one batched query per relation.
pub(crate) fn hydrate(conn: &Connection, notes: Vec<NoteRow>, with_shares: bool) -> Result<Vec<NoteRecord>> {
    if notes.is_empty() {
        return Ok(vec![]);
    }

    let note_ids: Vec<Value> = notes.iter().map(|n| Value::Text(n.id.to_string())).collect();
    let author_ids: Vec<Value> = notes
        .iter()
        .map(|n| n.user_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .map(|id| Value::Text(id.to_string()))
        .collect();

    let mut authors: HashMap<Uuid, PublicUser> = HashMap::new();
    {
        let sql = format!(
            "SELECT id, username, avatar_url FROM users WHERE id IN ({})",
            placeholders(author_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(author_ids.iter()), |row| {
            Ok(PublicUser {
                id: uuid_at(row, 0)?,
                username: row.get(1)?,
                avatar_url: row.get(2)?,
            })
        })?;
        for user in rows {
            let user = user?;
            authors.insert(user.id, user);
        }
    }

    let mut attachments: HashMap<Uuid, Vec<_>> = HashMap::new();
    {
        let sql = format!(
            "SELECT {} FROM attachments a WHERE a.note_id IN ({}) ORDER BY a.created_at, a.rowid",
            crate::attachments::ATTACHMENT_COLUMNS,
            placeholders(note_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(note_ids.iter()), map_attachment)?;
        for attachment in rows {
            let attachment = attachment?;
            if let Some(note_id) = attachment.note_id {
                attachments.entry(note_id).or_default().push(attachment);
            }
        }
    }

    let mut shares: HashMap<Uuid, Vec<_>> = HashMap::new();
    if with_shares {
        let sql = format!(
            "{SHARE_SELECT} WHERE s.note_id IN ({}) ORDER BY s.created_at, s.rowid",
            placeholders(note_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(note_ids.iter()), map_share)?;
        for share in rows {
            let share = share?;
            shares.entry(share.note_id).or_default().push(share);
        }
    }

    notes
        .into_iter()
        .map(|note| {
            let author = authors
                .get(&note.user_id)
                .cloned()
                .ok_or(StoreError::NotFound("user"))?;
            Ok(NoteRecord {
                attachments: attachments.remove(&note.id).unwrap_or_default(),
                shares: shares.remove(&note.id).unwrap_or_default(),
                author,
                note,
            })
        })
        .collect()
}
