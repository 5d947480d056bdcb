//! CSV interchange for snippet lists.
//!
//! Decoding is a two-stage pipeline: [`parser::parse_rows`] turns text into raw
//! cells without ever failing, then each row is normalized into a [`Snippet`]
//! or dropped. Nothing in this module performs I/O.

pub mod parser;

use crate::constants::{DEFAULT_CATEGORY, DEFAULT_LANGUAGE, DEFAULT_TITLE, EXPORT_FILE_PREFIX};
use crate::models::snippet::{generate_id, or_default, Snippet};
use crate::time_util::now_millis;
use chrono::NaiveDate;

/// Byte-order mark prepended to exported files so spreadsheet tools pick UTF-8.
pub const BOM: char = '\u{feff}';

/// Known CSV columns in canonical export order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvColumn {
    Id,
    Title,
    Category,
    Language,
    Code,
    CreatedAt,
    UpdatedAt,
}

impl CsvColumn {
    /// Every column, in canonical order.
    pub const ALL: [CsvColumn; 7] = [
        CsvColumn::Id,
        CsvColumn::Title,
        CsvColumn::Category,
        CsvColumn::Language,
        CsvColumn::Code,
        CsvColumn::CreatedAt,
        CsvColumn::UpdatedAt,
    ];

    /// Header name written on export.
    pub fn name(self) -> &'static str {
        match self {
            CsvColumn::Id => "id",
            CsvColumn::Title => "title",
            CsvColumn::Category => "category",
            CsvColumn::Language => "language",
            CsvColumn::Code => "code",
            CsvColumn::CreatedAt => "createdAt",
            CsvColumn::UpdatedAt => "updatedAt",
        }
    }

    /// Match a header cell, ignoring case and surrounding whitespace.
    pub fn from_header(cell: &str) -> Option<Self> {
        let cell = cell.trim();
        Self::ALL
            .into_iter()
            .find(|column| column.name().eq_ignore_ascii_case(cell))
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Result of decoding CSV text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvImport {
    pub snippets: Vec<Snippet>,
    /// Non-fatal, human-readable notes about skipped input.
    pub warnings: Vec<String>,
}

/// Column positions resolved from the header row (or the canonical order).
struct ColumnMap {
    positions: [Option<usize>; 7],
}

impl ColumnMap {
    fn canonical() -> Self {
        let mut positions = [None; 7];
        for column in CsvColumn::ALL {
            positions[column.index()] = Some(column.index());
        }
        Self { positions }
    }

    /// Build a map from `row` when it looks like a header; first occurrence wins.
    fn from_header_row(row: &[String]) -> Option<Self> {
        let mut positions = [None; 7];
        let mut matched = false;
        for (idx, cell) in row.iter().enumerate() {
            if let Some(column) = CsvColumn::from_header(cell) {
                matched = true;
                positions[column.index()].get_or_insert(idx);
            }
        }
        matched.then_some(Self { positions })
    }

    fn cell<'a>(&self, row: &'a [String], column: CsvColumn) -> &'a str {
        self.positions[column.index()]
            .and_then(|idx| row.get(idx))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Raw field values pulled from one data row before normalization.
#[derive(Debug, Default)]
struct RowCandidate {
    id: String,
    title: String,
    category: String,
    language: String,
    code: String,
    created_at: Option<i64>,
    updated_at: Option<i64>,
}

fn quote_cell(value: &str) -> String {
    let normalized = value.replace("\r\n", "\n");
    format!("\"{}\"", normalized.replace('"', "\"\""))
}

fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .map(|number| number as i64)
    })
}

/// Apply import defaults to a candidate row.
///
/// # Returns
/// `None` when the row has no code, otherwise a complete snippet.
fn normalize_row(candidate: RowCandidate, now: i64) -> Option<Snippet> {
    if candidate.code.trim().is_empty() {
        return None;
    }
    let created_at = candidate.created_at.unwrap_or(now);
    let updated_at = candidate.updated_at.unwrap_or(created_at);
    let id = candidate.id.trim();
    Some(Snippet {
        id: if id.is_empty() {
            generate_id()
        } else {
            id.to_string()
        },
        title: or_default(&candidate.title, DEFAULT_TITLE),
        code: candidate.code,
        category: or_default(&candidate.category, DEFAULT_CATEGORY),
        language: or_default(&candidate.language, DEFAULT_LANGUAGE),
        created_at,
        updated_at,
    })
}

/// Serialize snippets to CSV in the order given.
///
/// Every cell, header included, is double-quoted. Rows are joined with `\n`
/// and there is no trailing newline.
pub fn encode(snippets: &[Snippet]) -> String {
    let header = CsvColumn::ALL
        .iter()
        .map(|column| quote_cell(column.name()))
        .collect::<Vec<_>>()
        .join(",");

    let mut lines = Vec::with_capacity(snippets.len() + 1);
    lines.push(header);
    for snippet in snippets {
        let cells = [
            quote_cell(&snippet.id),
            quote_cell(&snippet.title),
            quote_cell(&snippet.category),
            quote_cell(&snippet.language),
            quote_cell(&snippet.code),
            quote_cell(&snippet.created_at.to_string()),
            quote_cell(&snippet.updated_at.to_string()),
        ];
        lines.push(cells.join(","));
    }
    lines.join("\n")
}

/// Parse CSV text into snippets plus warnings. Never fails.
///
/// A header row is recognised when any of its cells names a known column;
/// otherwise the canonical column order is assumed from the first row.
pub fn decode(text: &str) -> CsvImport {
    let mut result = CsvImport::default();
    let trimmed = text.strip_prefix(BOM).unwrap_or(text).trim();
    if trimmed.is_empty() {
        return result;
    }

    let rows = parser::parse_rows(trimmed);
    let Some(first) = rows.first() else {
        return result;
    };
    let (columns, data_start) = match ColumnMap::from_header_row(first) {
        Some(map) => (map, 1),
        None => (ColumnMap::canonical(), 0),
    };

    let now = now_millis();
    let mut skipped = 0usize;
    for row in &rows[data_start..] {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let candidate = RowCandidate {
            id: columns.cell(row, CsvColumn::Id).to_string(),
            title: columns.cell(row, CsvColumn::Title).to_string(),
            category: columns.cell(row, CsvColumn::Category).to_string(),
            language: columns.cell(row, CsvColumn::Language).to_string(),
            code: columns.cell(row, CsvColumn::Code).to_string(),
            created_at: parse_timestamp(columns.cell(row, CsvColumn::CreatedAt)),
            updated_at: parse_timestamp(columns.cell(row, CsvColumn::UpdatedAt)),
        };
        match normalize_row(candidate, now) {
            Some(snippet) => result.snippets.push(snippet),
            None => skipped += 1,
        }
    }

    if result.snippets.is_empty() {
        result
            .warnings
            .push("No valid snippets found (each row needs a non-empty code field)".to_string());
    } else if skipped > 0 {
        result
            .warnings
            .push(format!("Skipped {} row(s) without code", skipped));
    }

    tracing::debug!(
        "Decoded {} snippet(s) from CSV, skipped {}",
        result.snippets.len(),
        skipped
    );
    result
}

/// CSV text ready to be written to a downloadable file (BOM-prefixed).
pub fn export_csv(snippets: &[Snippet]) -> String {
    let mut text = String::new();
    text.push(BOM);
    text.push_str(&encode(snippets));
    text
}

/// File name offered for an export made on `date`.
pub fn export_file_name(date: NaiveDate) -> String {
    format!("{}-{}.csv", EXPORT_FILE_PREFIX, date.format("%Y%m%d"))
}
