//! Snippet list orchestration between a UI and the storage/CSV layers.
//!
//! [`SnippetLibrary`] owns the in-memory collection and writes it back through
//! [`SnippetStore`] on every mutation. The in-memory list only changes after a
//! save succeeds. Filtering, paging and import merging are plain functions so
//! they can be used without a store.

use crate::constants::{ALL_CATEGORIES, PAGE_SIZE};
use crate::csv::{self, CsvImport};
use crate::error::AppError;
use crate::models::snippet::{
    create_snippet, dedupe_by_id, sort_by_recency, update_snippet, Snippet, SnippetDraft,
};
use crate::storage::SnippetStore;
use chrono::{Local, NaiveDate};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// How imported snippets combine with the existing collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Id-keyed union; imported records overwrite existing ones with the same id.
    Merge,
    /// The collection becomes exactly the imported list.
    Replace,
}

/// List filter: category selector plus free-text query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnippetFilter {
    /// `None` matches every category.
    pub category: Option<String>,
    pub query: String,
}

impl SnippetFilter {
    /// Build a filter from a UI category selector where `"All"` means no filter.
    pub fn new(category: &str, query: &str) -> Self {
        let category = (category != ALL_CATEGORIES).then(|| category.to_string());
        Self {
            category,
            query: query.to_string(),
        }
    }

    /// Whether `snippet` passes this filter.
    ///
    /// The query is trimmed and compared case-insensitively against title,
    /// code, category and language.
    pub fn matches(&self, snippet: &Snippet) -> bool {
        if let Some(category) = &self.category {
            if &snippet.category != category {
                return false;
            }
        }
        let query = self.query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        [
            &snippet.title,
            &snippet.code,
            &snippet.category,
            &snippet.language,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&query))
    }
}

/// One page of filtered snippets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetPage<'a> {
    pub items: Vec<&'a Snippet>,
    /// 1-based page actually shown, after clamping.
    pub page: usize,
    pub page_count: usize,
    /// Number of snippets matching the filter.
    pub total: usize,
}

/// Snippets matching `filter`, in collection order.
pub fn filter_snippets<'a>(snippets: &'a [Snippet], filter: &SnippetFilter) -> Vec<&'a Snippet> {
    snippets.iter().filter(|s| filter.matches(s)).collect()
}

/// Number of pages needed for `total` items; never less than one.
pub fn page_count(total: usize) -> usize {
    total.div_ceil(PAGE_SIZE).max(1)
}

/// Slice `items` into the requested 1-based page, clamping out-of-range pages.
pub fn paginate(items: Vec<&Snippet>, page: usize) -> SnippetPage<'_> {
    let total = items.len();
    let page_count = page_count(total);
    let page = page.clamp(1, page_count);
    let start = (page - 1) * PAGE_SIZE;
    let items = items.into_iter().skip(start).take(PAGE_SIZE).collect();
    SnippetPage {
        items,
        page,
        page_count,
        total,
    }
}

/// Distinct non-blank categories, sorted.
pub fn categories(snippets: &[Snippet]) -> Vec<String> {
    snippets
        .iter()
        .filter(|s| !s.category.trim().is_empty())
        .map(|s| s.category.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Snippet count per category.
pub fn category_counts(snippets: &[Snippet]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for snippet in snippets {
        *counts.entry(snippet.category.clone()).or_insert(0) += 1;
    }
    counts
}

/// Id-keyed union of `existing` and `imported`; imported records win on collision.
///
/// Existing order is kept for surviving ids and new ids are appended in import
/// order. Callers re-sort before persisting.
pub fn merge_import(existing: &[Snippet], imported: Vec<Snippet>) -> Vec<Snippet> {
    let mut merged: Vec<Snippet> = existing.to_vec();
    let mut positions: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(idx, snippet)| (snippet.id.clone(), idx))
        .collect();

    for snippet in imported {
        match positions.get(&snippet.id) {
            Some(&idx) => merged[idx] = snippet,
            None => {
                positions.insert(snippet.id.clone(), merged.len());
                merged.push(snippet);
            }
        }
    }
    merged
}

/// Combine `imported` with `existing` according to `mode`.
pub fn apply_import(mode: ImportMode, existing: &[Snippet], imported: Vec<Snippet>) -> Vec<Snippet> {
    match mode {
        ImportMode::Merge => merge_import(existing, imported),
        ImportMode::Replace => imported,
    }
}

/// Read and decode a CSV file for import.
///
/// Invalid UTF-8 is replaced rather than rejected; the codec drops anything
/// it cannot use.
///
/// # Errors
/// Returns [`AppError::Io`] when the file cannot be read.
pub async fn read_import_file(path: &Path) -> Result<CsvImport, AppError> {
    let bytes = tokio::fs::read(path).await?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(csv::decode(&text))
}

/// In-memory snippet collection persisted through a [`SnippetStore`].
pub struct SnippetLibrary {
    store: SnippetStore,
    snippets: Vec<Snippet>,
}

impl SnippetLibrary {
    /// Load the persisted collection.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub async fn load(store: SnippetStore) -> Result<Self, AppError> {
        let snippets = store.load_snippets().await?;
        Ok(Self { store, snippets })
    }

    /// Current collection, most recently updated first.
    pub fn snippets(&self) -> &[Snippet] {
        &self.snippets
    }

    /// Look up a snippet by id.
    pub fn get(&self, id: &str) -> Option<&Snippet> {
        self.snippets.iter().find(|s| s.id == id)
    }

    /// Id of the most recent snippet, used to pick a selection after changes.
    pub fn first_id(&self) -> Option<&str> {
        self.snippets.first().map(|s| s.id.as_str())
    }

    pub fn categories(&self) -> Vec<String> {
        categories(&self.snippets)
    }

    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        category_counts(&self.snippets)
    }

    /// Filter then paginate the collection.
    pub fn page(&self, filter: &SnippetFilter, page: usize) -> SnippetPage<'_> {
        paginate(filter_snippets(&self.snippets, filter), page)
    }

    async fn persist(&mut self, mut next: Vec<Snippet>) -> Result<(), AppError> {
        sort_by_recency(&mut next);
        dedupe_by_id(&mut next);
        self.store.save_snippets(&next).await?;
        self.snippets = next;
        Ok(())
    }

    /// Create a snippet from an editor draft.
    ///
    /// # Errors
    /// Returns [`AppError::BadRequest`] for a draft without code, or the
    /// storage error when saving fails.
    pub async fn create(&mut self, draft: SnippetDraft) -> Result<Snippet, AppError> {
        let created = create_snippet(draft.normalized()?);
        let mut next = Vec::with_capacity(self.snippets.len() + 1);
        next.push(created.clone());
        next.extend(self.snippets.iter().cloned());
        self.persist(next).await?;
        tracing::debug!("Created snippet {}", created.id);
        Ok(created)
    }

    /// Overwrite the editable fields of snippet `id` with `draft`.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] for an unknown id,
    /// [`AppError::BadRequest`] for a draft without code, or the storage error.
    pub async fn edit(&mut self, id: &str, draft: SnippetDraft) -> Result<Snippet, AppError> {
        let draft = draft.normalized()?;
        let existing = self.get(id).ok_or(AppError::NotFound)?;
        let updated = update_snippet(existing, draft.into_patch());

        let mut next = Vec::with_capacity(self.snippets.len());
        next.push(updated.clone());
        next.extend(self.snippets.iter().filter(|s| s.id != id).cloned());
        self.persist(next).await?;
        Ok(updated)
    }

    /// Remove snippet `id`.
    ///
    /// # Returns
    /// `false` when no snippet had that id (nothing is written).
    ///
    /// # Errors
    /// Propagates storage failures.
    pub async fn delete(&mut self, id: &str) -> Result<bool, AppError> {
        if self.get(id).is_none() {
            return Ok(false);
        }
        let next = self.snippets.iter().filter(|s| s.id != id).cloned().collect();
        self.persist(next).await?;
        Ok(true)
    }

    /// Apply decoded import records using `mode` and persist the result.
    ///
    /// # Errors
    /// Propagates storage failures; the in-memory list is unchanged on error.
    pub async fn import(&mut self, mode: ImportMode, imported: Vec<Snippet>) -> Result<(), AppError> {
        let count = imported.len();
        let next = apply_import(mode, &self.snippets, imported);
        self.persist(next).await?;
        tracing::info!(
            "Imported {} snippet(s) ({:?}); collection now holds {}",
            count,
            mode,
            self.snippets.len()
        );
        Ok(())
    }

    /// CSV export of the current collection, BOM-prefixed.
    pub fn export_csv(&self) -> String {
        csv::export_csv(&self.snippets)
    }

    /// Write the export into `dir` under a dated file name.
    ///
    /// # Returns
    /// Path of the written file.
    ///
    /// # Errors
    /// Returns [`AppError::Io`] when the file cannot be written.
    pub async fn export_to_dir(&self, dir: &Path, date: NaiveDate) -> Result<PathBuf, AppError> {
        let path = dir.join(csv::export_file_name(date));
        tokio::fs::write(&path, self.export_csv()).await?;
        tracing::info!("Exported {} snippet(s) to {:?}", self.snippets.len(), path);
        Ok(path)
    }

    /// Write today's export into `dir`.
    ///
    /// # Errors
    /// Returns [`AppError::Io`] when the file cannot be written.
    pub async fn export_today(&self, dir: &Path) -> Result<PathBuf, AppError> {
        self.export_to_dir(dir, Local::now().date_naive()).await
    }
}
