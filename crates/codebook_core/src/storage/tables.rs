//! redb table definitions for the document store.

use redb::TableDefinition;

/// Canonical snippet rows keyed by snippet id (`Snippet`, bincode-encoded).
pub const SNIPPETS: TableDefinition<&str, &[u8]> = TableDefinition::new("snippets");
