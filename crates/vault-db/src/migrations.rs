use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                username            TEXT NOT NULL UNIQUE,
                email               TEXT NOT NULL UNIQUE,
                federated_uid       TEXT UNIQUE,
                password            TEXT,
                avatar_url          TEXT,
                notes_count         INTEGER NOT NULL DEFAULT 0,
                deleted_notes_count INTEGER NOT NULL DEFAULT 0,
                attachments_count   INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE TABLE notes (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON UPDATE CASCADE ON DELETE CASCADE,
                title       TEXT NOT NULL,
                content     TEXT NOT NULL,
                encrypted   INTEGER NOT NULL DEFAULT 0,
                archived    INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                deleted_at  TEXT
            );

            CREATE INDEX idx_notes_user ON notes(user_id, created_at);
            CREATE INDEX idx_notes_deleted ON notes(user_id, deleted_at);

            -- Hard-deleting a note detaches its attachments; it never deletes them.
            -- object_key is the ingestion idempotency key.
            CREATE TABLE attachments (
                id          TEXT PRIMARY KEY,
                note_id     TEXT REFERENCES notes(id) ON UPDATE CASCADE ON DELETE SET NULL,
                object_key  TEXT NOT NULL UNIQUE,
                file_name   TEXT NOT NULL,
                mime_type   TEXT NOT NULL,
                size        INTEGER NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_attachments_note ON attachments(note_id, created_at);

            CREATE TABLE note_shares (
                id                  TEXT PRIMARY KEY,
                note_id             TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                shared_with_user_id TEXT NOT NULL REFERENCES users(id) ON UPDATE CASCADE ON DELETE CASCADE,
                permission          TEXT NOT NULL CHECK (permission IN ('read', 'write')),
                expires             TEXT,
                created_at          TEXT NOT NULL,
                UNIQUE(note_id, shared_with_user_id)
            );

            CREATE INDEX idx_note_shares_user ON note_shares(shared_with_user_id);

            -- Denormalized counters, maintained inside the mutating statement.

            CREATE TRIGGER notes_count_insert AFTER INSERT ON notes
            BEGIN
                UPDATE users
                   SET notes_count = notes_count + (NEW.deleted_at IS NULL),
                       deleted_notes_count = deleted_notes_count + (NEW.deleted_at IS NOT NULL)
                 WHERE id = NEW.user_id;
            END;

            CREATE TRIGGER notes_count_soft_delete AFTER UPDATE OF deleted_at ON notes
            WHEN OLD.deleted_at IS NULL AND NEW.deleted_at IS NOT NULL
            BEGIN
                UPDATE users
                   SET notes_count = notes_count - 1,
                       deleted_notes_count = deleted_notes_count + 1
                 WHERE id = NEW.user_id;
            END;

            CREATE TRIGGER notes_count_restore AFTER UPDATE OF deleted_at ON notes
            WHEN OLD.deleted_at IS NOT NULL AND NEW.deleted_at IS NULL
            BEGIN
                UPDATE users
                   SET notes_count = notes_count + 1,
                       deleted_notes_count = deleted_notes_count - 1
                 WHERE id = NEW.user_id;
            END;

            CREATE TRIGGER notes_count_delete AFTER DELETE ON notes
            BEGIN
                UPDATE users
                   SET notes_count = notes_count - (OLD.deleted_at IS NULL),
                       deleted_notes_count = deleted_notes_count - (OLD.deleted_at IS NOT NULL)
                 WHERE id = OLD.user_id;
            END;

            -- Runs before ON DELETE SET NULL detaches the rows.
            CREATE TRIGGER attachments_count_note_delete BEFORE DELETE ON notes
            BEGIN
                UPDATE users
                   SET attachments_count = attachments_count
                       - (SELECT COUNT(*) FROM attachments WHERE note_id = OLD.id)
                 WHERE id = OLD.user_id;
            END;

            CREATE TRIGGER attachments_count_insert AFTER INSERT ON attachments
            WHEN NEW.note_id IS NOT NULL
            BEGIN
                UPDATE users
                   SET attachments_count = attachments_count + 1
                 WHERE id = (SELECT user_id FROM notes WHERE id = NEW.note_id);
            END;

            CREATE TRIGGER attachments_count_delete AFTER DELETE ON attachments
            WHEN OLD.note_id IS NOT NULL
            BEGIN
                UPDATE users
                   SET attachments_count = attachments_count - 1
                 WHERE id = (SELECT user_id FROM notes WHERE id = OLD.note_id);
            END;

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
