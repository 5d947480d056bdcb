//! Snippet entity, construction/update helpers and persisted-shape validation.

use crate::constants::{DEFAULT_CATEGORY, DEFAULT_LANGUAGE, DEFAULT_TITLE};
use crate::error::AppError;
use crate::time_util::now_millis;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

/// A persisted code snippet.
///
/// Field names serialize in camelCase so the key-value document and CSV
/// headers share one vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub id: String,
    pub title: String,
    pub code: String,
    pub category: String,
    pub language: String,
    /// Unix milliseconds, set once at creation.
    pub created_at: i64,
    /// Unix milliseconds, refreshed on every mutation.
    pub updated_at: i64,
}

/// Editor input for creating or editing a snippet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnippetDraft {
    pub title: String,
    pub code: String,
    pub category: String,
    pub language: String,
}

/// Partial update applied by [`update_snippet`]. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnippetPatch {
    pub title: Option<String>,
    pub code: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
}

impl Snippet {
    /// Whether this record may be persisted (non-blank `code`).
    pub fn is_valid(&self) -> bool {
        !self.code.trim().is_empty()
    }
}

impl SnippetDraft {
    /// Apply editor defaults and reject drafts without code.
    ///
    /// Blank title, category and language fall back to their defaults and the
    /// code body is trimmed.
    ///
    /// # Errors
    /// Returns [`AppError::BadRequest`] when the trimmed code is empty.
    pub fn normalized(&self) -> Result<Self, AppError> {
        let code = self.code.trim();
        if code.is_empty() {
            return Err(AppError::BadRequest("Code cannot be empty".to_string()));
        }
        Ok(Self {
            title: or_default(&self.title, DEFAULT_TITLE),
            code: code.to_string(),
            category: or_default(&self.category, DEFAULT_CATEGORY),
            language: or_default(&self.language, DEFAULT_LANGUAGE),
        })
    }

    /// Convert the draft into a patch that overwrites every editable field.
    pub fn into_patch(self) -> SnippetPatch {
        SnippetPatch {
            title: Some(self.title),
            code: Some(self.code),
            category: Some(self.category),
            language: Some(self.language),
        }
    }
}

/// Return the trimmed value, or `fallback` when it is blank.
pub(crate) fn or_default(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Generate a fresh snippet id.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Build a new snippet with a fresh id and equal creation/update stamps.
///
/// Pure constructor: fields are taken as given, no I/O happens.
pub fn create_snippet(input: SnippetDraft) -> Snippet {
    let now = now_millis();
    Snippet {
        id: generate_id(),
        title: input.title,
        code: input.code,
        category: input.category,
        language: input.language,
        created_at: now,
        updated_at: now,
    }
}

/// Merge `patch` into a copy of `snippet` and refresh `updated_at`.
///
/// The refreshed stamp never moves backwards, even for an empty patch or a
/// record stamped ahead of the local clock.
pub fn update_snippet(snippet: &Snippet, patch: SnippetPatch) -> Snippet {
    let mut updated = snippet.clone();
    if let Some(title) = patch.title {
        updated.title = title;
    }
    if let Some(code) = patch.code {
        updated.code = code;
    }
    if let Some(category) = patch.category {
        updated.category = category;
    }
    if let Some(language) = patch.language {
        updated.language = language;
    }
    updated.updated_at = now_millis().max(snippet.updated_at);
    updated
}

/// Sort snippets most recently updated first.
pub fn sort_by_recency(snippets: &mut [Snippet]) {
    snippets.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

/// Keep only the first record for each id.
///
/// Run after [`sort_by_recency`] so the newest copy of a duplicated id wins.
///
/// # Returns
/// Number of records removed.
pub fn dedupe_by_id(snippets: &mut Vec<Snippet>) -> usize {
    let before = snippets.len();
    let mut seen = HashSet::with_capacity(before);
    snippets.retain(|snippet| seen.insert(snippet.id.clone()));
    before - snippets.len()
}

fn string_field(record: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    record.get(key)?.as_str().map(str::to_string)
}

fn timestamp_field(record: &serde_json::Map<String, Value>, key: &str) -> Option<i64> {
    let value = record.get(key)?;
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|number| number.is_finite())
            .map(|number| number as i64)
    })
}

/// Validate one persisted JSON value against the snippet shape.
///
/// # Returns
/// `Some(snippet)` when every field is present with the right type, else `None`.
pub fn snippet_from_value(value: &Value) -> Option<Snippet> {
    let record = value.as_object()?;
    Some(Snippet {
        id: string_field(record, "id")?,
        title: string_field(record, "title")?,
        code: string_field(record, "code")?,
        category: string_field(record, "category")?,
        language: string_field(record, "language")?,
        created_at: timestamp_field(record, "createdAt")?,
        updated_at: timestamp_field(record, "updatedAt")?,
    })
}

/// Extract every well-shaped snippet from a persisted JSON value.
///
/// Non-array values yield an empty list; malformed elements are skipped.
pub fn snippets_from_value(value: &Value) -> Vec<Snippet> {
    let Some(items) = value.as_array() else {
        if !value.is_null() {
            tracing::warn!("Persisted snippet list is not an array; ignoring it");
        }
        return Vec::new();
    };
    let snippets: Vec<Snippet> = items.iter().filter_map(snippet_from_value).collect();
    let dropped = items.len() - snippets.len();
    if dropped > 0 {
        tracing::warn!("Dropped {} malformed persisted snippet(s)", dropped);
    }
    snippets
}
