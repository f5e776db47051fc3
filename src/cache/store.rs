//! Cache open/create lifecycle: owner binding, schema versioning, encryption,
//! and reset (Component D, §4.2).

use crate::cache::schema::{self, meta_keys};
use crate::error::Result;
use rand::RngCore;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Hard-coded application salt mixed into the owner identity hash (§3).
/// Not a secret: it only needs to differ per deployment of this bridge so a
/// cache file can't accidentally be reused by an unrelated application.
const OWNER_HASH_SALT: &str = "notecache-bridge/v1";

/// Whether opening the cache required a destructive reset, and why. The
/// sync engine treats any variant other than `Clean` as `full_resync_required`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Clean,
    ResetOwnerMismatch,
    ResetSchemaMismatch,
    ResetIntegrityFailure,
    ResetFreshCreate,
}

impl OpenOutcome {
    pub fn full_resync_required(self) -> bool {
        !matches!(self, Self::Clean)
    }
}

/// Derive the owner identity hash from the account username (§3).
pub fn owner_identity_hash(username: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update(OWNER_HASH_SALT.as_bytes());
    hex::encode(hasher.finalize())
}

/// Opens (creating if absent, resetting if inconsistent) the cache file at
/// `path` and returns the ready connection plus whether a reset happened.
pub fn open_or_create(
    path: &Path,
    owner_hash: &str,
    encryption_key: Option<&str>,
    kdf_iterations: u32,
) -> Result<(Connection, OpenOutcome)> {
    let existed = path.exists();
    let mut outcome = OpenOutcome::Clean;

    let conn = open_keyed(path, encryption_key, kdf_iterations, existed)?;

    let conn = match probe(&conn) {
        Ok(()) => conn,
        Err(_) => {
            tracing::warn!(path = %path.display(), "cache probe failed, recreating");
            drop(conn);
            delete_store_files(path);
            outcome = OpenOutcome::ResetFreshCreate;
            open_keyed(path, encryption_key, kdf_iterations, false)?
        }
    };

    if integrity_check_failed(&conn) {
        tracing::warn!(path = %path.display(), "integrity check failed, resetting cache");
        drop(conn);
        delete_store_files(path);
        outcome = OpenOutcome::ResetIntegrityFailure;
        let conn = open_keyed(path, encryption_key, kdf_iterations, false)?;
        return finish_open(conn, path, owner_hash, encryption_key, outcome);
    }

    finish_open(conn, path, owner_hash, encryption_key, outcome)
}

fn finish_open(
    conn: Connection,
    path: &Path,
    owner_hash: &str,
    encryption_key: Option<&str>,
    mut outcome: OpenOutcome,
) -> Result<(Connection, OpenOutcome)> {
    let stored_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    let tables_exist = table_exists(&conn, "notes")?;

    let conn = if (stored_version == 0 && tables_exist) || stored_version != schema::SCHEMA_VERSION
    {
        if tables_exist {
            tracing::warn!(
                stored_version,
                compiled = schema::SCHEMA_VERSION,
                "schema version mismatch, resetting cache"
            );
            outcome = OpenOutcome::ResetSchemaMismatch;
        }
        drop(conn);
        delete_store_files(path);
        open_keyed(path, encryption_key, 0, false)?
    } else {
        conn
    };

    let stored_owner: Option<String> = read_meta(&conn, meta_keys::OWNER_IDENTITY_HASH)?;
    let conn = match stored_owner {
        Some(stored) if stored == owner_hash => conn,
        Some(_) => {
            tracing::warn!("owner identity mismatch, resetting cache");
            outcome = OpenOutcome::ResetOwnerMismatch;
            drop(conn);
            delete_store_files(path);
            open_keyed(path, encryption_key, 0, false)?
        }
        None if table_exists(&conn, "notes")? => {
            tracing::warn!("owner identity missing but tables exist, resetting cache");
            outcome = OpenOutcome::ResetOwnerMismatch;
            drop(conn);
            delete_store_files(path);
            open_keyed(path, encryption_key, 0, false)?
        }
        None => conn,
    };

    conn.execute_batch(schema::STANDARD_PRAGMAS)?;
    schema::create_schema(&conn)?;
    write_meta(&conn, meta_keys::OWNER_IDENTITY_HASH, owner_hash)?;

    Ok((conn, outcome))
}

fn open_keyed(
    path: &Path,
    encryption_key: Option<&str>,
    kdf_iterations: u32,
    existed: bool,
) -> Result<Connection> {
    let conn = Connection::open(path)?;
    if let Some(key) = encryption_key {
        conn.pragma_update(None, "key", key)?;
        if !existed {
            conn.pragma_update(None, "kdf_iter", kdf_iterations)?;
            let salt = random_salt_hex();
            conn.execute_batch(schema::CREATE_METADATA_TABLE)?;
            write_meta(&conn, meta_keys::DB_KEY_SALT_HEX, &salt)?;
        }
    }
    Ok(conn)
}

fn probe(conn: &Connection) -> rusqlite::Result<()> {
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |_| Ok(()))
}

fn integrity_check_failed(conn: &Connection) -> bool {
    match conn.query_row("PRAGMA quick_check", [], |r| r.get::<_, String>(0)) {
        Ok(result) => result != "ok",
        Err(_) => true,
    }
}

fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [name],
        |r| r.get::<_, i64>(0),
    )
    .map(|count| count > 0)
}

pub fn read_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM cache_metadata WHERE key = ?1",
        [key],
        |r| r.get(0),
    )
    .map(Some)
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
    })
}

pub fn write_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO cache_metadata(key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

fn random_salt_hex() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Deletes the main db file plus its WAL/SHM siblings, per §4.2/§4.8 `reset_cache`.
pub fn delete_store_files(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let candidate: PathBuf = append_suffix(path, suffix);
        if candidate.exists() {
            if let Err(err) = std::fs::remove_file(&candidate) {
                tracing::warn!(path = %candidate.display(), error = %err, "failed to remove cache file");
            }
        }
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    if suffix.is_empty() {
        return path.to_path_buf();
    }
    let mut os_string = path.as_os_str().to_owned();
    os_string.push(suffix);
    PathBuf::from(os_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn owner_hash_is_stable_and_salted() {
        let a = owner_identity_hash("alice");
        let b = owner_identity_hash("alice");
        let c = owner_identity_hash("bob");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn fresh_open_creates_schema_and_binds_owner() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.sqlite3");
        let owner = owner_identity_hash("alice");
        let (conn, outcome) = open_or_create(&path, &owner, None, 310_000).unwrap();
        assert!(!outcome.full_resync_required());
        let stored = read_meta(&conn, meta_keys::OWNER_IDENTITY_HASH).unwrap();
        assert_eq!(stored.as_deref(), Some(owner.as_str()));
    }

    #[test]
    fn owner_mismatch_triggers_reset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.sqlite3");
        let owner_a = owner_identity_hash("alice");
        open_or_create(&path, &owner_a, None, 310_000).unwrap();

        let owner_b = owner_identity_hash("bob");
        let (conn, outcome) = open_or_create(&path, &owner_b, None, 310_000).unwrap();
        assert!(outcome.full_resync_required());
        let stored = read_meta(&conn, meta_keys::OWNER_IDENTITY_HASH).unwrap();
        assert_eq!(stored.as_deref(), Some(owner_b.as_str()));
    }
}
