//! `save_note` tool (Component F, §4.6).

use crate::cache::{CacheHandle, Note};
use crate::client::BackendClient;
use crate::error::{Error, Result};
use crate::patch::apply_patch;
use crate::protocol::ToolHandler;
use crate::schema::{parse_and_validate, SaveNoteParams};
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct SaveNoteTool {
    cache: CacheHandle,
    client: Arc<BackendClient>,
    bucket: String,
}

impl SaveNoteTool {
    pub fn new(cache: CacheHandle, client: Arc<BackendClient>, bucket: String) -> Self {
        Self {
            cache,
            client,
            bucket,
        }
    }
}

struct ResolvedSave {
    id: Option<String>,
    local_version: Option<i64>,
    created_at: Option<i64>,
    text: String,
    tags: Vec<String>,
    trash: bool,
    base_version: Option<i64>,
}

fn now_epoch_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl ToolHandler for SaveNoteTool {
    fn name(&self) -> &'static str {
        "save_note"
    }

    fn description(&self) -> &'static str {
        "Create or update a note, by full text or line-addressed patch."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "local_version": { "type": "integer" },
                "server_version": { "type": "integer" },
                "text": { "type": "string" },
                "text_patch": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "op": { "enum": ["add", "mod", "del"] },
                            "line_number": { "type": "integer", "minimum": 1 },
                            "value": { "type": "string" }
                        },
                        "required": ["op", "line_number"]
                    }
                },
                "tags": { "type": "array", "items": { "type": "string" } },
                "trash": { "type": "boolean" }
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let params: SaveNoteParams = parse_and_validate(arguments)?;
        let resolved = self.resolve(&params).await?;

        let id = resolved.id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let payload = json!({
            "text": resolved.text,
            "tags": resolved.tags,
            "deleted": resolved.trash,
        });

        let outcome = self
            .client
            .save(&self.bucket, &id, &payload, resolved.base_version)
            .await?;

        let note = self.commit(id, resolved, &outcome.new_version, outcome.echoed_data).await?;
        Ok(serde_json::to_value(note)?)
    }
}

impl SaveNoteTool {
    async fn resolve(&self, params: &SaveNoteParams) -> Result<ResolvedSave> {
        match &params.id {
            None => {
                let text = match (&params.text, &params.text_patch) {
                    (Some(t), None) => t.clone(),
                    (None, Some(patch)) => apply_patch("", patch),
                    _ => unreachable!("validated: exactly one of text/text_patch for new notes"),
                };
                Ok(ResolvedSave {
                    id: None,
                    local_version: None,
                    created_at: None,
                    text,
                    tags: params.tags.clone().unwrap_or_default(),
                    trash: params.trash.unwrap_or(false),
                    base_version: None,
                })
            }
            Some(id) => {
                let id = id.clone();
                let local_version = params.local_version;
                let row: Option<Note> = self
                    .cache
                    .run(move |conn| {
                        conn.query_row(
                            "SELECT id, local_version, server_version, text, tags, modified_at, created_at, trash, sync_deleted
                             FROM notes WHERE id = ?1 AND local_version = ?2",
                            params![id, local_version],
                            Note::from_row,
                        )
                        .optional()
                        .map_err(Error::from)
                    })
                    .await?;

                let row = row.ok_or_else(|| Error::NotFound(id.clone()))?;

                let text = match (&params.text, &params.text_patch) {
                    (Some(t), None) => t.clone(),
                    (None, Some(patch)) => apply_patch(&row.text, patch),
                    (None, None) => row.text.clone(),
                    (Some(_), Some(_)) => unreachable!("validated mutually exclusive"),
                };

                Ok(ResolvedSave {
                    id: Some(id),
                    local_version: Some(row.local_version),
                    created_at: Some(row.created_at),
                    text,
                    tags: params.tags.clone().unwrap_or(row.tags),
                    trash: params.trash.unwrap_or(row.trash),
                    base_version: params.server_version.or(row.server_version),
                })
            }
        }
    }

    async fn commit(
        &self,
        id: String,
        resolved: ResolvedSave,
        new_version: &i64,
        echoed: Value,
    ) -> Result<Note> {
        let echoed_text = echoed.get("text").and_then(Value::as_str).map(str::to_string);
        let echoed_tags: Option<Vec<String>> = echoed.get("tags").and_then(Value::as_array).map(|arr| {
            arr.iter().filter_map(Value::as_str).map(str::to_string).collect()
        });

        let final_text = echoed_text.unwrap_or(resolved.text);
        let final_tags = echoed_tags.unwrap_or(resolved.tags);
        let final_trash = resolved.trash;
        let next_local_version = resolved.local_version.unwrap_or(0) + 1;
        let server_version = *new_version;
        let now = now_epoch_secs();
        let created_at = resolved.created_at.unwrap_or(now);
        let id_for_write = id.clone();
        let tags_json = serde_json::to_string(&final_tags).unwrap_or_else(|_| "[]".to_string());

        self.cache
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO notes(id, local_version, server_version, text, tags, modified_at, created_at, trash, sync_deleted)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)
                     ON CONFLICT(id) DO UPDATE SET
                        local_version = excluded.local_version,
                        server_version = excluded.server_version,
                        text = excluded.text,
                        tags = excluded.tags,
                        modified_at = excluded.modified_at,
                        trash = excluded.trash",
                    params![id_for_write, next_local_version, server_version, final_text, tags_json, now, created_at, final_trash as i64],
                )?;
                Ok(())
            })
            .await?;

        Ok(Note {
            id,
            local_version: next_local_version,
            server_version: Some(server_version),
            text: final_text,
            tags: final_tags,
            modified_at: now,
            created_at,
            trash: final_trash,
            sync_deleted: false,
        })
    }
}
