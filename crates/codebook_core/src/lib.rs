//! Core library for Codebook: snippet model, CSV interchange and persistence.

/// Configuration loading and capability flags.
pub mod config;
/// Shared constants (storage keys, defaults, paging).
pub mod constants;
/// CSV encode/decode for snippet interchange.
pub mod csv;
/// Application error types.
pub mod error;
/// Snippet list orchestration (filtering, paging, import/export).
pub mod library;
/// Snippet data model.
pub mod models;
/// Storage backends and the one-time migration between them.
pub mod storage;
/// Timestamp helpers.
pub mod time_util;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use constants::*;
pub use error::AppError;
pub use library::{ImportMode, SnippetFilter, SnippetLibrary, SnippetPage};
pub use models::snippet::{create_snippet, update_snippet, Snippet, SnippetDraft, SnippetPatch};
pub use storage::SnippetStore;
