//! The cached note record (§3).

use serde::Serialize;

/// A cached note row.
#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub id: String,
    pub local_version: i64,
    pub server_version: Option<i64>,
    pub text: String,
    pub tags: Vec<String>,
    pub modified_at: i64,
    pub created_at: i64,
    pub trash: bool,
    pub sync_deleted: bool,
}

impl Note {
    /// Build from a `rusqlite::Row` with columns in `notes` table order.
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let tags_json: String = row.get("tags")?;
        let tags = parse_tags(&tags_json);
        Ok(Self {
            id: row.get("id")?,
            local_version: row.get("local_version")?,
            server_version: row.get("server_version")?,
            text: row.get("text")?,
            tags,
            modified_at: row.get("modified_at")?,
            created_at: row.get("created_at")?,
            trash: row.get::<_, i64>("trash")? != 0,
            sync_deleted: row.get::<_, i64>("sync_deleted")? != 0,
        })
    }

    pub fn tags_json(&self) -> String {
        serde_json::to_string(&self.tags).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Parses a stored tags JSON array; malformed JSON degrades to empty and is
/// logged, per §3's invariant on `tags`.
pub fn parse_tags(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(tags) => tags,
        Err(err) => {
            tracing::warn!(error = %err, raw, "malformed tags JSON, treating as empty");
            Vec::new()
        }
    }
}
