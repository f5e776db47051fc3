//! `manage_notes` tool (Component F, §4.8).

use crate::cache::schema::meta_keys;
use crate::cache::store::read_meta;
use crate::cache::{CacheHandle, Note};
use crate::client::BackendClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::ToolHandler;
use crate::schema::{parse_and_validate, ManageAction, ManageNotesParams};
use crate::sync::SyncEngine;
use async_trait::async_trait;
use rusqlite::OptionalExtension;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

pub struct ManageNotesTool {
    cache: CacheHandle,
    client: Arc<BackendClient>,
    sync: Arc<SyncEngine>,
    bucket: String,
    cache_file_path: PathBuf,
}

impl ManageNotesTool {
    pub fn new(
        cache: CacheHandle,
        client: Arc<BackendClient>,
        sync: Arc<SyncEngine>,
        bucket: String,
        config: &Config,
        owner_hash: &str,
    ) -> Self {
        Self {
            cache,
            client,
            sync,
            bucket,
            cache_file_path: config.cache_file_path(owner_hash),
        }
    }
}

#[async_trait]
impl ToolHandler for ManageNotesTool {
    fn name(&self) -> &'static str {
        "manage_notes"
    }

    fn description(&self) -> &'static str {
        "Cache maintenance: stats, reset, trash/untrash, and permanent deletion."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "enum": ["get_stats", "reset_cache", "trash", "untrash", "delete_permanently"] },
                "id": { "type": "string" },
                "local_version": { "type": "integer" }
            },
            "required": ["action"]
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let params: ManageNotesParams = parse_and_validate(arguments)?;
        match params.action {
            ManageAction::GetStats => self.get_stats().await,
            ManageAction::ResetCache => self.reset_cache().await,
            ManageAction::Trash => self.set_trash(&params, true).await,
            ManageAction::Untrash => self.set_trash(&params, false).await,
            ManageAction::DeletePermanently => self.delete_permanently(&params).await,
        }
    }
}

impl ManageNotesTool {
    async fn get_stats(&self) -> Result<Value> {
        let (total_notes, schema_version, cursor, last_attempt, last_success, last_duration, last_status, error_count) =
            self.cache
                .run(|conn| {
                    let total_notes: i64 = conn.query_row("SELECT count(*) FROM notes", [], |r| r.get(0))?;
                    let schema_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
                    let cursor = read_meta(conn, meta_keys::BACKEND_CURSOR)?;
                    let last_attempt = read_meta(conn, meta_keys::LAST_SYNC_ATTEMPT_AT)?;
                    let last_success = read_meta(conn, meta_keys::LAST_SUCCESSFUL_SYNC_AT)?;
                    let last_duration = read_meta(conn, meta_keys::LAST_SYNC_DURATION_MS)?;
                    let last_status = read_meta(conn, meta_keys::LAST_SYNC_STATUS)?;
                    let error_count = read_meta(conn, meta_keys::SYNC_ERROR_COUNT)?;
                    Ok((
                        total_notes,
                        schema_version,
                        cursor,
                        last_attempt,
                        last_success,
                        last_duration,
                        last_status,
                        error_count,
                    ))
                })
                .await?;

        let memory_rss_mib = process_memory_rss_mib();
        let cache_file_size = std::fs::metadata(&self.cache_file_path).map(|m| m.len()).unwrap_or(0);

        Ok(json!({
            "total_notes": total_notes,
            "schema_version": schema_version,
            "memory_rss_mib": memory_rss_mib,
            "cache_file_size_bytes": cache_file_size,
            "backend_cursor": cursor,
            "last_sync_attempt_at": last_attempt,
            "last_successful_sync_at": last_success,
            "last_sync_duration_ms": last_duration,
            "last_sync_status": last_status,
            "sync_error_count": error_count,
        }))
    }

    async fn reset_cache(&self) -> Result<Value> {
        crate::cache::store::delete_store_files(&self.cache_file_path);
        self.sync.request_full_resync();
        Ok(json!({ "acknowledged": true }))
    }

    async fn set_trash(&self, params: &ManageNotesParams, trash: bool) -> Result<Value> {
        let id = params.id.clone().expect("validated: id required");
        let local_version = params.local_version.expect("validated: local_version required");

        let row = self
            .cache
            .run({
                let id = id.clone();
                move |conn| {
                    conn.query_row(
                        "SELECT id, local_version, server_version, text, tags, modified_at, created_at, trash, sync_deleted
                         FROM notes WHERE id = ?1 AND local_version = ?2",
                        rusqlite::params![id, local_version],
                        Note::from_row,
                    )
                    .optional()
                    .map_err(Error::from)
                }
            })
            .await?;

        let row = row.ok_or_else(|| Error::NotFound(id.clone()))?;

        let payload = json!({
            "text": row.text,
            "tags": row.tags,
            "deleted": trash,
        });

        let outcome = self
            .client
            .save(&self.bucket, &id, &payload, row.server_version)
            .await?;

        let next_local_version = row.local_version + 1;
        let new_version = outcome.new_version;
        let id_for_write = id.clone();
        self.cache
            .run(move |conn| {
                conn.execute(
                    "UPDATE notes SET trash = ?1, local_version = ?2, server_version = ?3 WHERE id = ?4",
                    rusqlite::params![trash as i64, next_local_version, new_version, id_for_write],
                )?;
                Ok(())
            })
            .await?;

        Ok(json!({
            "id": id,
            "local_version": next_local_version,
            "server_version": new_version,
            "trash": trash,
        }))
    }

    async fn delete_permanently(&self, params: &ManageNotesParams) -> Result<Value> {
        let id = params.id.clone().expect("validated: id required");
        let deleted = self
            .cache
            .run({
                let id = id.clone();
                move |conn| {
                    let changed = conn.execute("DELETE FROM notes WHERE id = ?1", [&id])?;
                    Ok(changed)
                }
            })
            .await?;

        if deleted == 0 {
            return Err(Error::NotFound(id));
        }
        Ok(json!({ "id": id, "deleted": true }))
    }
}

fn process_memory_rss_mib() -> f64 {
    use sysinfo::{Pid, System};
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
        .unwrap_or(0.0)
}
