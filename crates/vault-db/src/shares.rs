//! Sharing: grant, list and revoke access to a note for another user.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use crate::models::{NoteShareRow, SharedNoteRecord, UserRow, permission_at, uuid_at};
use crate::notes::{NOTE_COLUMNS, Page, Visibility, find_note, hydrate, query_notes};
use crate::users::query_user;
use crate::{Database, Result, StoreError};
use vault_types::Permission;
use vault_types::models::PublicUser;

pub(crate) const SHARE_SELECT: &str = "SELECT s.id, s.note_id, s.permission, s.expires, s.created_at, \
     u.id, u.username, u.avatar_url \
     FROM note_shares s JOIN users u ON u.id = s.shared_with_user_id";

/// Which field matched when resolving a share target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserLookup {
    Id,
    Email,
    Username,
}

impl Database {
    /// Grant `permission` on a note the caller owns. A second grant to the
    /// same user replaces permission and expiry on the existing row.
    pub fn share_note(
        &self,
        owner: Uuid,
        note_id: Uuid,
        target: &str,
        permission: &str,
        expires: Option<DateTime<Utc>>,
    ) -> Result<NoteShareRow> {
        self.with_conn(|conn| {
            find_note(conn, owner, note_id, Visibility::Live)?.ok_or(StoreError::NotFound("note"))?;

            let permission: Permission = permission
                .parse()
                .map_err(|e: vault_types::permission::InvalidPermission| StoreError::validation(e.to_string()))?;

            let (user, matched) = resolve_user(conn, target)?.ok_or(StoreError::NotFound("user"))?;
            if user.id == owner {
                return Err(StoreError::validation("cannot share a note with its owner"));
            }
            if let Some(at) = expires {
                if at <= Utc::now() {
                    return Err(StoreError::validation("expiry must be in the future"));
                }
            }

            conn.execute(
                "INSERT INTO note_shares (id, note_id, shared_with_user_id, permission, expires, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(note_id, shared_with_user_id)
                 DO UPDATE SET permission = excluded.permission, expires = excluded.expires",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    note_id.to_string(),
                    user.id.to_string(),
                    permission.as_str(),
                    expires,
                    Utc::now()
                ],
            )?;
            debug!(note_id = %note_id, with = %user.id, ?matched, %permission, "note shared");

            query_share(conn, note_id, user.id)?.ok_or(StoreError::NotFound("share"))
        })
    }

    pub fn list_shares(&self, owner: Uuid, note_id: Uuid) -> Result<Vec<NoteShareRow>> {
        self.with_conn(|conn| {
            find_note(conn, owner, note_id, Visibility::Live)?.ok_or(StoreError::NotFound("note"))?;

            let sql = format!("{SHARE_SELECT} WHERE s.note_id = ?1 ORDER BY s.created_at, s.rowid");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([note_id.to_string()], map_share)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Idempotent: returns whether a share was actually removed.
    pub fn revoke_share(&self, owner: Uuid, note_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            find_note(conn, owner, note_id, Visibility::Live)?.ok_or(StoreError::NotFound("note"))?;

            let n = conn.execute(
                "DELETE FROM note_shares WHERE note_id = ?1 AND shared_with_user_id = ?2",
                [note_id.to_string(), user_id.to_string()],
            )?;
            Ok(n > 0)
        })
    }

    /// Live notes shared with `user` whose share has not expired at `now`,
    /// newest first. Other recipients of the same note are not exposed.
    pub fn list_shared_with(
        &self,
        user: Uuid,
        page: Page,
        now: DateTime<Utc>,
    ) -> Result<(Vec<SharedNoteRecord>, i64)> {
        self.with_conn(|conn| {
            let from = format!(
                "FROM notes n JOIN note_shares s ON s.note_id = n.id
                  WHERE s.shared_with_user_id = ?1 AND {}
                    AND (s.expires IS NULL OR s.expires > ?2)",
                Visibility::Live.predicate()
            );

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) {from}"),
                rusqlite::params![user.to_string(), now],
                |r| r.get(0),
            )?;

            let rows = query_notes(
                conn,
                &format!(
                    "SELECT {NOTE_COLUMNS} {from} ORDER BY n.created_at DESC, n.rowid DESC LIMIT ?3 OFFSET ?4"
                ),
                rusqlite::params![user.to_string(), now, page.limit, page.offset()],
            )?;

            let records = hydrate(conn, rows, false)?;
            let mut shared = Vec::with_capacity(records.len());
            for record in records {
                let share = query_share(conn, record.note.id, user)?.ok_or(StoreError::NotFound("share"))?;
                shared.push(SharedNoteRecord {
                    record,
                    permission: share.permission,
                    expires: share.expires,
                });
            }
            Ok((shared, total))
        })
    }

    pub fn resolve_user(&self, target: &str) -> Result<Option<(UserRow, UserLookup)>> {
        self.with_conn(|conn| resolve_user(conn, target))
    }
}

/// Precedence is id (when the input parses as one), then email, then
/// username. The first field that matches wins.
fn resolve_user(conn: &Connection, target: &str) -> Result<Option<(UserRow, UserLookup)>> {
    let target = target.trim();
    if target.is_empty() {
        return Err(StoreError::validation("share target must not be empty"));
    }

    if let Ok(id) = Uuid::parse_str(target) {
        if let Some(user) = query_user(conn, "id", &id.to_string())? {
            return Ok(Some((user, UserLookup::Id)));
        }
    }
    if let Some(user) = query_user(conn, "email", target)? {
        return Ok(Some((user, UserLookup::Email)));
    }
    Ok(query_user(conn, "username", target)?.map(|user| (user, UserLookup::Username)))
}

fn query_share(conn: &Connection, note_id: Uuid, user_id: Uuid) -> Result<Option<NoteShareRow>> {
    let sql = format!("{SHARE_SELECT} WHERE s.note_id = ?1 AND s.shared_with_user_id = ?2");
    let row = conn
        .query_row(&sql, [note_id.to_string(), user_id.to_string()], map_share)
        .optional()?;
    Ok(row)
}

pub(crate) fn map_share(row: &Row<'_>) -> rusqlite::Result<NoteShareRow> {
    Ok(NoteShareRow {
        id: uuid_at(row, 0)?,
        note_id: uuid_at(row, 1)?,
        permission: permission_at(row, 2)?,
        expires: row.get(3)?,
        created_at: row.get(4)?,
        shared_with: PublicUser {
            id: uuid_at(row, 5)?,
            username: row.get(6)?,
            avatar_url: row.get(7)?,
        },
    })
}
