//! Declarative input validation for tool payloads (Component B).
//!
//! Each tool's argument type derives `Deserialize` for the JSON shape and
//! exposes a `validate` that enforces the invariants §4.6-§4.8 state beyond
//! what serde's types already guarantee. Validation failures are always
//! `Error::Validation { field, message }` so the field path reaches the
//! caller unmodified.

use crate::error::{Error, Result};
use serde::Deserialize;

const MAX_TAGS: usize = 100;
const MAX_TAG_BYTES: usize = 100;
const MAX_BATCH_GET: usize = 20;

/// One line-addressed patch operation (§4.5).
#[derive(Debug, Clone, Deserialize)]
pub struct PatchOp {
    pub op: PatchOpKind,
    pub line_number: i64,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    Add,
    Mod,
    Del,
}

fn validate_tags(tags: &[String], field: &str) -> Result<()> {
    if tags.len() > MAX_TAGS {
        return Err(Error::validation(
            field,
            format!("at most {MAX_TAGS} tags are allowed, got {}", tags.len()),
        ));
    }
    for (i, tag) in tags.iter().enumerate() {
        let len = tag.len();
        if len == 0 || len > MAX_TAG_BYTES {
            return Err(Error::validation(
                format!("{field}[{i}]"),
                format!("tag must be 1-{MAX_TAG_BYTES} bytes, got {len}"),
            ));
        }
    }
    Ok(())
}

fn validate_patch(patch: &[PatchOp], field: &str) -> Result<()> {
    for (i, op) in patch.iter().enumerate() {
        if op.line_number < 1 {
            return Err(Error::validation(
                format!("{field}[{i}].line_number"),
                "line_number must be >= 1".to_string(),
            ));
        }
        if matches!(op.op, PatchOpKind::Add | PatchOpKind::Mod) && op.value.is_none() {
            return Err(Error::validation(
                format!("{field}[{i}].value"),
                "value is required for add/mod operations".to_string(),
            ));
        }
    }
    Ok(())
}

/// Arguments for `save_note` (§4.6).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SaveNoteParams {
    pub id: Option<String>,
    pub local_version: Option<i64>,
    pub server_version: Option<i64>,
    pub text: Option<String>,
    pub text_patch: Option<Vec<PatchOp>>,
    pub tags: Option<Vec<String>>,
    pub trash: Option<bool>,
}

impl SaveNoteParams {
    pub fn validate(&self) -> Result<()> {
        if self.id.is_some() && self.local_version.is_none() {
            return Err(Error::validation(
                "local_version",
                "local_version is required when id is present",
            ));
        }
        match (&self.text, &self.text_patch) {
            (Some(_), Some(_)) => {
                return Err(Error::validation(
                    "text",
                    "text and text_patch are mutually exclusive",
                ))
            }
            (None, None) if self.id.is_none() => {
                return Err(Error::validation(
                    "text",
                    "a new note requires text or text_patch",
                ))
            }
            _ => {}
        }
        if let Some(patch) = &self.text_patch {
            validate_patch(patch, "text_patch")?;
        }
        if let Some(tags) = &self.tags {
            validate_tags(tags, "tags")?;
        }
        Ok(())
    }
}

/// `trash_status` filter for `list_notes` (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrashStatus {
    #[default]
    Active,
    Trashed,
    Any,
}

/// Sortable columns for `list_notes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    ModifiedAt,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

fn default_limit() -> u32 {
    20
}
fn default_page() -> u32 {
    1
}
fn default_preview_lines() -> u32 {
    3
}

/// Arguments for `list_notes` (§4.7).
#[derive(Debug, Clone, Deserialize)]
pub struct ListNotesParams {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub trash_status: TrashStatus,
    #[serde(default)]
    pub date_before: Option<String>,
    #[serde(default)]
    pub date_after: Option<String>,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_preview_lines")]
    pub preview_lines: u32,
}

impl ListNotesParams {
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.limit) {
            return Err(Error::validation("limit", "limit must be in 1..=100"));
        }
        if self.page < 1 {
            return Err(Error::validation("page", "page must be >= 1"));
        }
        if !(1..=20).contains(&self.preview_lines) {
            return Err(Error::validation(
                "preview_lines",
                "preview_lines must be in 1..=20",
            ));
        }
        for date in [&self.date_before, &self.date_after].into_iter().flatten() {
            if chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                return Err(Error::validation(
                    "date_before/date_after",
                    format!("`{date}` is not a YYYY-MM-DD date"),
                ));
            }
        }
        if let Some(tags) = &self.tags {
            validate_tags(tags, "tags")?;
        }
        Ok(())
    }
}

/// Arguments for `get_note` (§4.8). Accepts either a single `id` or a batch
/// `ids`; `ids()` normalizes both forms.
#[derive(Debug, Clone, Deserialize)]
pub struct GetNoteParams {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub ids: Option<Vec<String>>,
    #[serde(default)]
    pub local_version: Option<i64>,
    #[serde(default)]
    pub range_line_start: Option<i64>,
    #[serde(default)]
    pub range_line_count: Option<i64>,
}

impl GetNoteParams {
    pub fn ids(&self) -> Vec<String> {
        match (&self.id, &self.ids) {
            (Some(single), None) => vec![single.clone()],
            (None, Some(many)) => many.clone(),
            (Some(single), Some(many)) => {
                let mut all = vec![single.clone()];
                all.extend(many.clone());
                all
            }
            (None, None) => vec![],
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ids = self.ids();
        if ids.is_empty() {
            return Err(Error::validation("id", "id or ids is required"));
        }
        if ids.len() > MAX_BATCH_GET {
            return Err(Error::validation(
                "ids",
                format!("at most {MAX_BATCH_GET} ids per call, got {}", ids.len()),
            ));
        }
        let single = ids.len() == 1;
        if !single && (self.local_version.is_some() || self.range_line_start.is_some()) {
            return Err(Error::validation(
                "local_version/range_line_start",
                "version pinning and line ranging only apply to a single id",
            ));
        }
        if let Some(count) = self.range_line_count {
            if count < 0 {
                return Err(Error::validation(
                    "range_line_count",
                    "range_line_count must be >= 0",
                ));
            }
        }
        Ok(())
    }
}

/// `manage_notes` action selector (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManageAction {
    GetStats,
    ResetCache,
    Trash,
    Untrash,
    DeletePermanently,
}

/// Arguments for `manage_notes` (§4.8).
#[derive(Debug, Clone, Deserialize)]
pub struct ManageNotesParams {
    pub action: ManageAction,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub local_version: Option<i64>,
}

impl ManageNotesParams {
    pub fn validate(&self) -> Result<()> {
        let needs_id = !matches!(self.action, ManageAction::GetStats | ManageAction::ResetCache);
        if needs_id && self.id.is_none() {
            return Err(Error::validation("id", "id is required for this action"));
        }
        if matches!(
            self.action,
            ManageAction::Trash | ManageAction::Untrash | ManageAction::DeletePermanently
        ) && self.local_version.is_none()
        {
            return Err(Error::validation(
                "local_version",
                "local_version is required for this action",
            ));
        }
        Ok(())
    }
}

/// Deserialize and validate a tool's arguments in one step.
pub fn parse_and_validate<T>(arguments: serde_json::Value) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Validated,
{
    let parsed: T = serde_json::from_value(arguments)
        .map_err(|e| Error::validation("arguments", e.to_string()))?;
    parsed.validate()?;
    Ok(parsed)
}

/// Implemented by every tool argument type; lets `parse_and_validate` be generic.
pub trait Validated {
    fn validate(&self) -> Result<()>;
}

impl Validated for SaveNoteParams {
    fn validate(&self) -> Result<()> {
        SaveNoteParams::validate(self)
    }
}
impl Validated for ListNotesParams {
    fn validate(&self) -> Result<()> {
        ListNotesParams::validate(self)
    }
}
impl Validated for GetNoteParams {
    fn validate(&self) -> Result<()> {
        GetNoteParams::validate(self)
    }
}
impl Validated for ManageNotesParams {
    fn validate(&self) -> Result<()> {
        ManageNotesParams::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn save_requires_local_version_when_id_present() {
        let params = SaveNoteParams {
            id: Some("abc".into()),
            text: Some("hi".into()),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn save_rejects_text_and_patch_together() {
        let params = SaveNoteParams {
            text: Some("hi".into()),
            text_patch: Some(vec![]),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn list_rejects_out_of_range_limit() {
        let mut params: ListNotesParams =
            serde_json::from_value(json!({ "limit": 0 })).unwrap();
        assert!(params.validate().is_err());
        params.limit = 20;
        assert!(params.validate().is_ok());
    }

    #[test]
    fn get_note_rejects_batch_with_version_pin() {
        let params = GetNoteParams {
            id: None,
            ids: Some(vec!["a".into(), "b".into()]),
            local_version: Some(1),
            range_line_start: None,
            range_line_count: None,
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn manage_trash_requires_local_version() {
        let params = ManageNotesParams {
            action: ManageAction::Trash,
            id: Some("a".into()),
            local_version: None,
        };
        assert!(params.validate().is_err());
    }
}
