use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::{UserRow, uuid_at};
use crate::{Database, Result, StoreError};

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: Option<&'a str>,
    pub federated_uid: Option<&'a str>,
}

const USER_COLUMNS: &str = "id, username, email, federated_uid, password, avatar_url, \
     notes_count, deleted_notes_count, attachments_count, created_at, updated_at";

impl Database {
    pub fn create_user(&self, new: NewUser<'_>) -> Result<UserRow> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, federated_uid, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![
                    id.to_string(),
                    new.username,
                    new.email,
                    new.federated_uid,
                    new.password_hash,
                    now
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    conflict_for(&e)
                } else {
                    StoreError::Database(e)
                }
            })?;

            query_user(conn, "id", &id.to_string())?.ok_or(StoreError::NotFound("user"))
        })
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    /// Last write wins. Returns the number of rows touched, which is zero
    /// when the user does not exist.
    pub fn set_avatar_url(&self, user_id: Uuid, url: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET avatar_url = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![url, Utc::now(), user_id.to_string()],
            )?;
            Ok(n)
        })
    }
}

fn conflict_for(err: &rusqlite::Error) -> StoreError {
    let msg = err.to_string();
    if msg.contains("users.email") {
        StoreError::Conflict("email already registered".into())
    } else if msg.contains("users.username") {
        StoreError::Conflict("username already taken".into())
    } else {
        StoreError::Conflict("user already exists".into())
    }
}

pub(crate) fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is always one of our own literals, never caller input.
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let row = conn.query_row(&sql, [value], map_user).optional()?;
    Ok(row)
}

pub(crate) fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: uuid_at(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        federated_uid: row.get(3)?,
        password: row.get(4)?,
        avatar_url: row.get(5)?,
        notes_count: row.get(6)?,
        deleted_notes_count: row.get(7)?,
        attachments_count: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}
