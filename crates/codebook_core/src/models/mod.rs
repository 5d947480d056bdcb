//! Data models for persistence and interchange.

/// Snippet entity, constructors and shape validation.
pub mod snippet;
