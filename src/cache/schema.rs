//! Cache schema: DDL, schema version, and the FTS shadow table (§4.2, §3).
//!
//! All DDL lives here as plain `const` strings — unlike the donor's
//! `lazy_static!`-built SQL, nothing here needs runtime formatting, so a
//! `const` is sufficient and one less dependency surface.

/// Compiled-in schema version, stored in the `user_version` pragma.
pub const SCHEMA_VERSION: i64 = 1;

pub const CREATE_NOTES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS notes (
    id              TEXT PRIMARY KEY,
    local_version   INTEGER NOT NULL,
    server_version  INTEGER,
    text            TEXT NOT NULL DEFAULT '',
    tags            TEXT NOT NULL DEFAULT '[]',
    modified_at     INTEGER NOT NULL,
    created_at      INTEGER NOT NULL,
    trash           INTEGER NOT NULL DEFAULT 0,
    sync_deleted    INTEGER NOT NULL DEFAULT 0
);
";

pub const CREATE_NOTES_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_notes_modified_at ON notes(modified_at);
CREATE INDEX IF NOT EXISTS idx_notes_trash ON notes(trash);
";

pub const CREATE_NOTES_FTS: &str = "
CREATE VIRTUAL TABLE IF NOT EXISTS notes_fts USING fts5(
    text,
    tags,
    content='notes',
    content_rowid='rowid',
    tokenize='porter unicode61 remove_diacritics 2'
);
";

pub const CREATE_NOTES_FTS_TRIGGERS: &str = "
CREATE TRIGGER IF NOT EXISTS notes_fts_insert AFTER INSERT ON notes BEGIN
    INSERT INTO notes_fts(rowid, text, tags) VALUES (new.rowid, new.text, new.tags);
END;

CREATE TRIGGER IF NOT EXISTS notes_fts_update AFTER UPDATE ON notes BEGIN
    INSERT INTO notes_fts(notes_fts, rowid, text, tags) VALUES ('delete', old.rowid, old.text, old.tags);
    INSERT INTO notes_fts(rowid, text, tags) VALUES (new.rowid, new.text, new.tags);
END;

CREATE TRIGGER IF NOT EXISTS notes_fts_delete AFTER DELETE ON notes BEGIN
    INSERT INTO notes_fts(notes_fts, rowid, text, tags) VALUES ('delete', old.rowid, old.text, old.tags);
END;
";

pub const CREATE_METADATA_TABLE: &str = "
CREATE TABLE IF NOT EXISTS cache_metadata (
    key     TEXT PRIMARY KEY,
    value   TEXT NOT NULL
);
";

/// Well-known keys in `cache_metadata` (§3).
pub mod meta_keys {
    pub const OWNER_IDENTITY_HASH: &str = "owner_identity_hash";
    pub const DB_KEY_SALT_HEX: &str = "db_key_salt_hex";
    pub const BACKEND_CURSOR: &str = "backend_cursor";
    pub const LAST_SYNC_ATTEMPT_AT: &str = "last_sync_attempt_at";
    pub const LAST_SUCCESSFUL_SYNC_AT: &str = "last_successful_sync_at";
    pub const LAST_SYNC_DURATION_MS: &str = "last_sync_duration_ms";
    pub const LAST_SYNC_STATUS: &str = "last_sync_status";
    pub const SYNC_ERROR_COUNT: &str = "sync_error_count";
}

pub fn set_user_version_sql(version: i64) -> String {
    format!("PRAGMA user_version = {version};")
}

/// Standard pragmas applied on every open (§4.2 step 5, plus `busy_timeout`).
pub const STANDARD_PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
";

/// Run the full DDL creation in one transaction. Callers are expected to
/// retry once with `DROP`+recreate semantics on failure, per §4.2; since
/// every statement already uses `IF NOT EXISTS`, a bare retry is safe.
pub fn create_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "BEGIN;
        {CREATE_NOTES_TABLE}
        {CREATE_NOTES_INDEXES}
        {CREATE_NOTES_FTS}
        {CREATE_NOTES_FTS_TRIGGERS}
        {CREATE_METADATA_TABLE}
        {}
        COMMIT;",
        set_user_version_sql(SCHEMA_VERSION)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_cleanly_on_fresh_connection() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        create_schema(&conn).unwrap();
    }
}
