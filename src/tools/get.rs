//! `get_note` tool (Component F, §4.8).

use crate::cache::{CacheHandle, Note};
use crate::error::{Error, Result};
use crate::protocol::ToolHandler;
use crate::schema::{parse_and_validate, GetNoteParams};
use async_trait::async_trait;
use rusqlite::OptionalExtension;
use serde_json::{json, Value};

const FTS_FALLBACK_LIMIT: i64 = 20;

pub struct GetNoteTool {
    cache: CacheHandle,
}

impl GetNoteTool {
    pub fn new(cache: CacheHandle) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl ToolHandler for GetNoteTool {
    fn name(&self) -> &'static str {
        "get_note"
    }

    fn description(&self) -> &'static str {
        "Fetch one or more notes by id, with optional version pin and line range."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "ids": { "type": "array", "items": { "type": "string" } },
                "local_version": { "type": "integer" },
                "range_line_start": { "type": "integer" },
                "range_line_count": { "type": "integer" }
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let params: GetNoteParams = parse_and_validate(arguments)?;
        let ids = params.ids();

        if ids.len() == 1 {
            self.get_single(&ids[0], &params).await
        } else {
            self.get_batch(&ids).await
        }
    }
}

impl GetNoteTool {
    async fn get_single(&self, id: &str, params: &GetNoteParams) -> Result<Value> {
        let id = id.to_string();
        let local_version = params.local_version;
        let note: Option<Note> = self
            .cache
            .run(move |conn| {
                let row = match local_version {
                    Some(v) => conn
                        .query_row(
                            "SELECT id, local_version, server_version, text, tags, modified_at, created_at, trash, sync_deleted
                             FROM notes WHERE id = ?1 AND local_version = ?2",
                            rusqlite::params![id, v],
                            Note::from_row,
                        )
                        .optional()?,
                    None => conn
                        .query_row(
                            "SELECT id, local_version, server_version, text, tags, modified_at, created_at, trash, sync_deleted
                             FROM notes WHERE id = ?1",
                            [&id],
                            Note::from_row,
                        )
                        .optional()?,
                };
                Ok(row)
            })
            .await?;

        match note {
            Some(note) => {
                let range = (params.range_line_start, params.range_line_count);
                Ok(render_single(&note, range))
            }
            None => self.fts_fallback(id.as_str()).await,
        }
    }

    async fn fts_fallback(&self, term: &str) -> Result<Value> {
        let term = term.to_string();
        let matches = self
            .cache
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT n.id, n.local_version, n.server_version, n.text, n.tags, n.modified_at, n.created_at, n.trash, n.sync_deleted
                     FROM notes n JOIN notes_fts f ON f.rowid = n.rowid
                     WHERE f.text MATCH ?1 ORDER BY rank LIMIT ?2",
                )?;
                let rows = stmt.query_map(rusqlite::params![term, FTS_FALLBACK_LIMIT], Note::from_row)?;
                rows.collect::<rusqlite::Result<Vec<Note>>>()
            })
            .await?;

        if matches.is_empty() {
            return Err(Error::NotFound(term));
        }

        Ok(json!({
            "fallback": "full_text_search",
            "matches": matches.iter().map(render_note_view).collect::<Vec<_>>(),
        }))
    }

    async fn get_batch(&self, ids: &[String]) -> Result<Value> {
        let ids = ids.to_vec();
        let notes = self
            .cache
            .run(move |conn| {
                let mut found = Vec::new();
                for id in &ids {
                    let note = conn
                        .query_row(
                            "SELECT id, local_version, server_version, text, tags, modified_at, created_at, trash, sync_deleted
                             FROM notes WHERE id = ?1",
                            [id],
                            Note::from_row,
                        )
                        .optional()?;
                    if let Some(note) = note {
                        found.push(note);
                    }
                }
                Ok(found)
            })
            .await?;

        Ok(json!({
            "notes": notes.iter().map(render_note_view).collect::<Vec<_>>(),
        }))
    }
}

fn render_note_view(note: &Note) -> Value {
    json!({
        "id": note.id,
        "local_version": note.local_version,
        "server_version": note.server_version,
        "text": note.text,
        "tags": note.tags,
        "modified_at": note.modified_at,
        "created_at": note.created_at,
        "trash": note.trash,
    })
}

fn render_single(note: &Note, range: (Option<i64>, Option<i64>)) -> Value {
    let mut value = render_note_view(note);
    if let (Some(start), count) = range {
        let lines: Vec<&str> = note.text.lines().collect();
        let start_idx = (start.max(1) - 1) as usize;
        let sliced = if start_idx >= lines.len() {
            Vec::new()
        } else {
            match count {
                Some(0) | None => lines[start_idx..].to_vec(),
                Some(n) => {
                    let end = (start_idx + n as usize).min(lines.len());
                    lines[start_idx..end].to_vec()
                }
            }
        };
        value["text"] = json!(sliced.join("\n"));
        value["range_line_start"] = json!(start);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_note(text: &str) -> Note {
        Note {
            id: "a".into(),
            local_version: 1,
            server_version: Some(1),
            text: text.to_string(),
            tags: vec![],
            modified_at: 1,
            created_at: 1,
            trash: false,
            sync_deleted: false,
        }
    }

    #[test]
    fn range_zero_count_means_to_end() {
        let note = sample_note("a\nb\nc\nd");
        let value = render_single(&note, (Some(2), Some(0)));
        assert_eq!(value["text"], json!("b\nc\nd"));
    }

    #[test]
    fn range_with_count_slices() {
        let note = sample_note("a\nb\nc\nd");
        let value = render_single(&note, (Some(2), Some(2)));
        assert_eq!(value["text"], json!("b\nc"));
    }

    #[test]
    fn no_range_leaves_text_untouched() {
        let note = sample_note("a\nb");
        let value = render_single(&note, (None, None));
        assert_eq!(value["text"], json!("a\nb"));
    }
}
