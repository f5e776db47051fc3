//! `list_notes` tool (Component F, §4.7).

use crate::cache::CacheHandle;
use crate::error::Result;
use crate::protocol::ToolHandler;
use crate::schema::{parse_and_validate, ListNotesParams, SortBy, SortOrder, TrashStatus};
use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use serde_json::{json, Value};

pub struct ListNotesTool {
    cache: CacheHandle,
}

impl ListNotesTool {
    pub fn new(cache: CacheHandle) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl ToolHandler for ListNotesTool {
    fn name(&self) -> &'static str {
        "list_notes"
    }

    fn description(&self) -> &'static str {
        "List, filter, and full-text-search the cached notes."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "tags": { "type": "array", "items": { "type": "string" } },
                "trash_status": { "enum": ["active", "trashed", "any"] },
                "date_before": { "type": "string" },
                "date_after": { "type": "string" },
                "sort_by": { "enum": ["modified_at", "created_at"] },
                "sort_order": { "enum": ["ASC", "DESC"] },
                "limit": { "type": "integer", "minimum": 1, "maximum": 100 },
                "page": { "type": "integer", "minimum": 1 },
                "preview_lines": { "type": "integer", "minimum": 1, "maximum": 20 }
            }
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let params: ListNotesParams = parse_and_validate(arguments)?;
        let plan = QueryPlan::build(&params);

        let result = self
            .cache
            .run(move |conn| plan.run(conn).map_err(crate::error::Error::from))
            .await?;
        Ok(result)
    }
}

/// A parsed `query` string, split into structured filters per §4.7.
struct ParsedQuery {
    tags: Vec<String>,
    date_before: Option<String>,
    date_after: Option<String>,
    text_term: Option<String>,
}

fn parse_query(query: Option<&str>) -> ParsedQuery {
    let mut tags = Vec::new();
    let mut date_before = None;
    let mut date_after = None;
    let mut remaining_words = Vec::new();

    if let Some(q) = query {
        for token in q.split_whitespace() {
            if let Some(tag) = token.strip_prefix("tag:") {
                tags.push(tag.to_string());
            } else if let Some(date) = token.strip_prefix("before:") {
                date_before = Some(date.to_string());
            } else if let Some(date) = token.strip_prefix("after:") {
                date_after = Some(date.to_string());
            } else {
                remaining_words.push(token);
            }
        }
    }

    ParsedQuery {
        tags,
        date_before,
        date_after,
        text_term: if remaining_words.is_empty() {
            None
        } else {
            Some(remaining_words.join(" "))
        },
    }
}

/// Converts a YYYY-MM-DD date to an epoch-seconds bound.
fn date_to_epoch(date: &str, end_of_day: bool) -> Option<i64> {
    let naive = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        chrono::NaiveTime::from_hms_opt(23, 59, 59)?
    } else {
        chrono::NaiveTime::from_hms_opt(0, 0, 0)?
    };
    Some(naive.and_time(time).and_utc().timestamp())
}

struct QueryPlan {
    where_clause: String,
    bind_values: Vec<SqlValue>,
    order_clause: String,
    limit: u32,
    offset: u32,
    page: u32,
    preview_lines: u32,
    has_fts: bool,
}

impl QueryPlan {
    fn build(params: &ListNotesParams) -> Self {
        let parsed = parse_query(params.query.as_deref());

        let mut effective_tags = parsed.tags;
        if let Some(extra) = &params.tags {
            effective_tags.extend(extra.clone());
        }

        let date_before = merge_date_bound(
            params.date_before.as_deref(),
            parsed.date_before.as_deref(),
            true,
            i64::min,
        );
        let date_after = merge_date_bound(
            params.date_after.as_deref(),
            parsed.date_after.as_deref(),
            false,
            i64::max,
        );

        let mut clauses: Vec<String> = Vec::new();
        let mut binds: Vec<SqlValue> = Vec::new();

        match params.trash_status {
            TrashStatus::Active => clauses.push("trash = 0".to_string()),
            TrashStatus::Trashed => clauses.push("trash = 1".to_string()),
            TrashStatus::Any => {}
        }

        for tag in &effective_tags {
            clauses.push(
                "EXISTS (SELECT 1 FROM json_each(notes.tags) WHERE value = ?)".to_string(),
            );
            binds.push(SqlValue::Text(tag.clone()));
        }

        if let Some(before) = date_before {
            clauses.push("modified_at < ?".to_string());
            binds.push(SqlValue::Integer(before));
        }
        if let Some(after) = date_after {
            clauses.push("modified_at > ?".to_string());
            binds.push(SqlValue::Integer(after));
        }

        let has_fts = parsed.text_term.is_some();
        if let Some(term) = &parsed.text_term {
            clauses.push("notes.rowid IN (SELECT rowid FROM notes_fts WHERE text MATCH ?)".to_string());
            binds.push(SqlValue::Text(term.clone()));
        }

        let where_clause = if clauses.is_empty() {
            "1=1".to_string()
        } else {
            clauses.join(" AND ")
        };

        let sort_col = match params.sort_by {
            SortBy::ModifiedAt => "modified_at",
            SortBy::CreatedAt => "created_at",
        };
        let sort_dir = match params.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let order_clause = if has_fts {
            format!("rank, {sort_col} {sort_dir}")
        } else {
            format!("{sort_col} {sort_dir}")
        };

        Self {
            where_clause,
            bind_values: binds,
            order_clause,
            limit: params.limit,
            offset: (params.page - 1) * params.limit,
            page: params.page,
            preview_lines: params.preview_lines,
            has_fts,
        }
    }

    fn run(&self, conn: &rusqlite::Connection) -> rusqlite::Result<Value> {
        let count_sql = format!("SELECT count(*) FROM notes WHERE {}", self.where_clause);
        let total_items: i64 = conn.query_row(
            &count_sql,
            rusqlite::params_from_iter(self.bind_values.iter()),
            |r| r.get(0),
        )?;

        let select_sql = format!(
            "SELECT id, local_version, server_version, text, tags, modified_at, created_at, trash, sync_deleted
             FROM notes WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            self.where_clause, self.order_clause
        );
        let mut stmt = conn.prepare(&select_sql)?;
        let mut all_binds = self.bind_values.clone();
        all_binds.push(SqlValue::Integer(i64::from(self.limit)));
        all_binds.push(SqlValue::Integer(i64::from(self.offset)));

        let rows = stmt.query_map(rusqlite::params_from_iter(all_binds.iter()), |row| {
            crate::cache::Note::from_row(row)
        })?;

        let preview_lines = self.preview_lines as usize;
        let mut content = Vec::new();
        for row in rows {
            let note = row?;
            let preview = preview_of(&note.text, preview_lines);
            content.push(json!({
                "id": note.id,
                "local_version": note.local_version,
                "server_version": note.server_version,
                "tags": note.tags,
                "modified_at": note.modified_at,
                "created_at": note.created_at,
                "trash": note.trash,
                "preview": preview,
            }));
        }

        let total_pages = if total_items == 0 {
            0
        } else {
            (total_items as u32).div_ceil(self.limit)
        };
        let next_page = if self.page < total_pages { Some(self.page + 1) } else { None };

        Ok(json!({
            "content": content,
            "total_items": total_items,
            "current_page": self.page,
            "total_pages": total_pages,
            "next_page": next_page,
        }))
    }
}

fn merge_date_bound(
    explicit: Option<&str>,
    from_query: Option<&str>,
    end_of_day: bool,
    pick: fn(i64, i64) -> i64,
) -> Option<i64> {
    let a = explicit.and_then(|d| date_to_epoch(d, end_of_day));
    let b = from_query.and_then(|d| date_to_epoch(d, end_of_day));
    match (a, b) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn preview_of(text: &str, preview_lines: usize) -> String {
    let preview: String = text
        .lines()
        .take(preview_lines)
        .collect::<Vec<_>>()
        .join("\n");
    let trimmed = preview.trim();
    if trimmed.is_empty() {
        "(empty note)".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tag_and_date_tokens_from_query() {
        let parsed = parse_query(Some("tag:work before:2024-01-01 after:2023-01-01 hello world"));
        assert_eq!(parsed.tags, vec!["work".to_string()]);
        assert_eq!(parsed.date_before.as_deref(), Some("2024-01-01"));
        assert_eq!(parsed.date_after.as_deref(), Some("2023-01-01"));
        assert_eq!(parsed.text_term.as_deref(), Some("hello world"));
    }

    #[test]
    fn preview_falls_back_for_empty_note() {
        assert_eq!(preview_of("", 3), "(empty note)");
        assert_eq!(preview_of("a\nb\nc\nd", 2), "a\nb");
    }
}
