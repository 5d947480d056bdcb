//! Shared constants used across Codebook.

/// Key under which the key-value backend stores the serialized snippet list.
pub const SNIPPETS_STORAGE_KEY: &str = "codebook:snippets:v1";

/// File name of the key-value backend document within the data directory.
pub const KEY_VALUE_FILE_NAME: &str = "storage.json";
/// Lock file guarding writes to the key-value document.
pub const KEY_VALUE_LOCK_FILE_NAME: &str = "storage.lock";

/// File name for the redb document store within the data directory.
pub const DOCUMENT_STORE_FILE_NAME: &str = "codebook.redb";

/// Title used when a snippet title is blank.
pub const DEFAULT_TITLE: &str = "Untitled";
/// Category used when a snippet category is blank.
pub const DEFAULT_CATEGORY: &str = "General";
/// Language used when a snippet language is blank.
pub const DEFAULT_LANGUAGE: &str = "text";

/// Category selector value that matches every snippet.
pub const ALL_CATEGORIES: &str = "All";

/// Snippets shown per list page.
pub const PAGE_SIZE: usize = 5;

/// Prefix of exported CSV file names.
pub const EXPORT_FILE_PREFIX: &str = "codebook-snippets";
