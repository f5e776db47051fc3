//! Server-wins conflict resolution (Component E, §4.4).

use rusqlite::{params, Connection};
use serde_json::Value;

/// One remote entry to reconcile against the local cache.
pub struct RemoteNote {
    pub id: String,
    pub server_version: i64,
    pub data: Value,
}

/// Apply one remote note to the cache per the server-wins rules in §4.4.
/// Must run inside the writer's connection (single-writer, §5).
pub fn apply_remote(conn: &Connection, remote: &RemoteNote, now: i64) -> rusqlite::Result<()> {
    let existing: Option<(i64, Option<i64>)> = conn
        .query_row(
            "SELECT local_version, server_version FROM notes WHERE id = ?1",
            [&remote.id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    let text = remote.data.get("text").and_then(Value::as_str).unwrap_or("");
    let tags: Vec<String> = remote
        .data
        .get("tags")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let tags_json = serde_json::to_string(&tags).unwrap_or_else(|_| "[]".to_string());
    let deleted = remote.data.get("deleted").and_then(Value::as_bool).unwrap_or(false);

    match existing {
        None => {
            conn.execute(
                "INSERT INTO notes(id, local_version, server_version, text, tags, modified_at, created_at, trash, sync_deleted)
                 VALUES (?1, 1, ?2, ?3, ?4, ?5, ?5, ?6, 0)",
                params![remote.id, remote.server_version, text, tags_json, now, deleted as i64],
            )?;
        }
        Some((local_version, server_version)) => {
            let should_apply = match server_version {
                None => true,
                Some(sv) if sv < remote.server_version => true,
                Some(sv) if sv > remote.server_version => {
                    tracing::warn!(
                        id = %remote.id,
                        local = sv,
                        incoming = remote.server_version,
                        "local server_version is ahead of incoming, keeping local (anomalous)"
                    );
                    false
                }
                _ => false,
            };
            if should_apply {
                conn.execute(
                    "UPDATE notes SET server_version = ?1, text = ?2, tags = ?3, modified_at = ?4,
                     trash = CASE WHEN ?5 THEN 1 ELSE trash END, local_version = ?6
                     WHERE id = ?7",
                    params![
                        remote.server_version,
                        text,
                        tags_json,
                        now,
                        deleted as i64,
                        local_version + 1,
                        remote.id
                    ],
                )?;
            }
        }
    }
    Ok(())
}

/// Mark a note as a tombstone after a per-entry `NotFound` during sync (§4.3).
pub fn mark_tombstone(conn: &Connection, id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE notes SET trash = 1, sync_deleted = 1, local_version = local_version + 1 WHERE id = ?1",
        [id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_with_schema() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::cache::schema::create_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn insert_when_no_local_row() {
        let conn = conn_with_schema();
        let remote = RemoteNote {
            id: "a".into(),
            server_version: 5,
            data: serde_json::json!({ "text": "hi", "tags": ["x"] }),
        };
        apply_remote(&conn, &remote, 100).unwrap();
        let (lv, sv, text): (i64, i64, String) = conn
            .query_row(
                "SELECT local_version, server_version, text FROM notes WHERE id='a'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!((lv, sv, text.as_str()), (1, 5, "hi"));
    }

    #[test]
    fn newer_remote_overwrites_local() {
        let conn = conn_with_schema();
        apply_remote(
            &conn,
            &RemoteNote {
                id: "a".into(),
                server_version: 1,
                data: serde_json::json!({ "text": "v1" }),
            },
            100,
        )
        .unwrap();
        apply_remote(
            &conn,
            &RemoteNote {
                id: "a".into(),
                server_version: 2,
                data: serde_json::json!({ "text": "v2" }),
            },
            200,
        )
        .unwrap();
        let (lv, text): (i64, String) = conn
            .query_row(
                "SELECT local_version, text FROM notes WHERE id='a'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!((lv, text.as_str()), (2, "v2"));
    }

    #[test]
    fn stale_remote_is_ignored() {
        let conn = conn_with_schema();
        apply_remote(
            &conn,
            &RemoteNote {
                id: "a".into(),
                server_version: 5,
                data: serde_json::json!({ "text": "v5" }),
            },
            100,
        )
        .unwrap();
        apply_remote(
            &conn,
            &RemoteNote {
                id: "a".into(),
                server_version: 3,
                data: serde_json::json!({ "text": "v3-stale" }),
            },
            200,
        )
        .unwrap();
        let text: String = conn
            .query_row("SELECT text FROM notes WHERE id='a'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(text, "v5");
    }
}
