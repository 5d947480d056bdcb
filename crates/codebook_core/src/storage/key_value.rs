//! Simple key-value storage persisted as one JSON document.
//!
//! This is the legacy backend: every key maps to an arbitrary JSON value and
//! snippets live under a single key as a JSON array.

use crate::constants::{KEY_VALUE_FILE_NAME, KEY_VALUE_LOCK_FILE_NAME};
use crate::error::AppError;
use fs2::FileExt;
use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// JSON-document key-value store rooted in a data directory.
#[derive(Debug, Clone)]
pub struct KeyValueStore {
    path: PathBuf,
    lock_path: PathBuf,
}

/// Holds the exclusive writer lock until dropped.
struct LockGuard {
    file: File,
    lock_path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::warn!(
                "Failed to release key-value lock {:?} during drop: {}",
                self.lock_path,
                err
            );
        }
    }
}

impl KeyValueStore {
    /// Bind a store to `data_dir`. No file is touched until the first access.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(KEY_VALUE_FILE_NAME),
            lock_path: data_dir.join(KEY_VALUE_LOCK_FILE_NAME),
        }
    }

    /// Path of the backing JSON document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<LockGuard, AppError> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|err| {
                AppError::StorageMessage(format!(
                    "Failed to open key-value lock '{}': {}",
                    self.lock_path.display(),
                    err
                ))
            })?;
        file.lock_exclusive().map_err(|err| {
            AppError::StorageMessage(format!(
                "Failed to acquire key-value lock '{}': {}",
                self.lock_path.display(),
                err
            ))
        })?;
        Ok(LockGuard {
            file,
            lock_path: self.lock_path.clone(),
        })
    }

    fn read_document(&self) -> Result<Map<String, Value>, AppError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(err.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => {
                tracing::warn!(
                    "Key-value document {:?} is not a JSON object; treating it as empty",
                    self.path
                );
                Ok(Map::new())
            }
            Err(err) => {
                tracing::warn!(
                    "Key-value document {:?} is unreadable ({}); treating it as empty",
                    self.path,
                    err
                );
                Ok(Map::new())
            }
        }
    }

    /// Replace the document via temp file + rename so readers never see a torn write.
    fn write_document(&self, document: &Map<String, Value>) -> Result<(), AppError> {
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            serde_json::to_writer(&mut tmp, document)?;
            tmp.flush()?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Read the value stored under `key`.
    ///
    /// # Returns
    /// `Ok(None)` when the key (or the whole document) is missing.
    ///
    /// # Errors
    /// Returns an error when the document exists but cannot be read.
    pub fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        let _guard = self.lock()?;
        Ok(self.read_document()?.remove(key))
    }

    /// Store `value` under `key`, keeping every other key intact.
    ///
    /// # Errors
    /// Returns an error when locking, serialization or the file write fails.
    pub fn set(&self, key: &str, value: Value) -> Result<(), AppError> {
        let _guard = self.lock()?;
        let mut document = self.read_document()?;
        document.insert(key.to_string(), value);
        self.write_document(&document)
    }

    /// Delete `key`.
    ///
    /// # Returns
    /// `true` when the key existed.
    ///
    /// # Errors
    /// Returns an error when locking or the file write fails.
    pub fn remove(&self, key: &str) -> Result<bool, AppError> {
        let _guard = self.lock()?;
        let mut document = self.read_document()?;
        if document.remove(key).is_none() {
            return Ok(false);
        }
        self.write_document(&document)?;
        Ok(true)
    }
}
