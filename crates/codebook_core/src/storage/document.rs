//! Embedded transactional document store backed by redb.

use super::tables::SNIPPETS;
use crate::error::AppError;
use crate::models::snippet::{sort_by_recency, Snippet};
use redb::{ReadableDatabase, ReadableTable};
use std::collections::HashSet;
use std::path::Path;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

/// Snippet rows keyed by id inside a single redb table.
pub struct DocumentStore {
    db: redb::Database,
    #[cfg(test)]
    fail_next_replace: AtomicBool,
}

impl DocumentStore {
    /// Open (or create) the database file and make sure the table exists.
    ///
    /// # Errors
    /// Returns an error when the file cannot be created/opened or the table
    /// cannot be initialized.
    pub fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = redb::Database::create(path)?;
        let write_txn = db.begin_write()?;
        write_txn.open_table(SNIPPETS)?;
        write_txn.commit()?;
        Ok(Self {
            db,
            #[cfg(test)]
            fail_next_replace: AtomicBool::new(false),
        })
    }

    /// Read every valid snippet, most recently updated first.
    ///
    /// Rows that fail to decode or have blank code are skipped.
    ///
    /// # Errors
    /// Returns an error when the read transaction fails.
    pub fn load_all(&self) -> Result<Vec<Snippet>, AppError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SNIPPETS)?;
        let mut snippets = Vec::new();
        let mut dropped = 0usize;

        for item in table.iter()? {
            let (key, value) = item?;
            match bincode::deserialize::<Snippet>(value.value()) {
                Ok(snippet) if snippet.is_valid() => snippets.push(snippet),
                Ok(_) => dropped += 1,
                Err(err) => {
                    tracing::debug!("Skipping undecodable snippet row {}: {}", key.value(), err);
                    dropped += 1;
                }
            }
        }

        if dropped > 0 {
            tracing::warn!("Dropped {} malformed snippet row(s) from the document store", dropped);
        }
        sort_by_recency(&mut snippets);
        Ok(snippets)
    }

    /// Number of rows currently stored, valid or not.
    ///
    /// # Errors
    /// Returns an error when the read transaction fails.
    pub fn len(&self) -> Result<u64, AppError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SNIPPETS)?;
        Ok(table.iter()?.count() as u64)
    }

    /// Ids of every stored row, valid or not.
    ///
    /// # Errors
    /// Returns an error when the read transaction fails.
    pub fn ids(&self) -> Result<HashSet<String>, AppError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SNIPPETS)?;
        let mut ids = HashSet::new();
        for item in table.iter()? {
            let (key, _) = item?;
            ids.insert(key.value().to_string());
        }
        Ok(ids)
    }

    /// Whether the table holds no rows at all.
    ///
    /// # Errors
    /// Returns an error when the read transaction fails.
    pub fn is_empty(&self) -> Result<bool, AppError> {
        Ok(self.len()? == 0)
    }

    /// Replace the entire snippet set in one write transaction.
    ///
    /// Either every row lands or the transaction is aborted and the previous
    /// contents remain.
    ///
    /// # Errors
    /// Returns an error when serialization or any storage step fails.
    pub fn replace_all(&self, snippets: &[Snippet]) -> Result<(), AppError> {
        let write_txn = self.db.begin_write()?;
        match self.write_rows(&write_txn, snippets) {
            Ok(()) => {
                write_txn.commit()?;
                Ok(())
            }
            Err(err) => {
                if let Err(abort_err) = write_txn.abort() {
                    tracing::error!("Failed to abort snippet replace transaction: {}", abort_err);
                }
                Err(err)
            }
        }
    }

    fn write_rows(
        &self,
        write_txn: &redb::WriteTransaction,
        snippets: &[Snippet],
    ) -> Result<(), AppError> {
        write_txn.delete_table(SNIPPETS)?;
        let mut table = write_txn.open_table(SNIPPETS)?;
        for snippet in snippets {
            let encoded = bincode::serialize(snippet)?;
            table.insert(snippet.id.as_str(), encoded.as_slice())?;
            #[cfg(test)]
            self.take_injected_failure()?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn take_injected_failure(&self) -> Result<(), AppError> {
        if self.fail_next_replace.swap(false, Ordering::SeqCst) {
            return Err(AppError::StorageMessage(
                "Injected replace failure".to_string(),
            ));
        }
        Ok(())
    }

    /// Make the next [`DocumentStore::replace_all`] fail after its first insert.
    #[cfg(test)]
    pub(crate) fn fail_next_replace(&self) {
        self.fail_next_replace.store(true, Ordering::SeqCst);
    }

    /// Insert raw bytes under `id`, bypassing encoding.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, id: &str, bytes: &[u8]) -> Result<(), AppError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SNIPPETS)?;
            table.insert(id, bytes)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
