//! Snippet persistence behind a uniform load-all/save-all contract.
//!
//! Two backends exist: the legacy [`key_value::KeyValueStore`] (one JSON
//! document, snippets under a single key) and the embedded
//! [`document::DocumentStore`] (redb). A capability probe picks one when the
//! store is opened; callers never learn which one served a request.
//!
//! When the document store is selected, the first load migrates any legacy
//! key-value snippets into it exactly once per store, with concurrent loads
//! awaiting the same in-flight migration.
//!
//! Callers are expected to serialize their own `save_snippets` calls; the
//! store only guarantees that each save is a single atomic replace.

/// Embedded document store (redb).
pub mod document;
/// Legacy JSON key-value store.
pub mod key_value;
/// redb table definitions.
pub mod tables;

use crate::config::Config;
use crate::constants::{DOCUMENT_STORE_FILE_NAME, SNIPPETS_STORAGE_KEY};
use crate::error::AppError;
use crate::models::snippet::{dedupe_by_id, snippets_from_value, sort_by_recency, Snippet};
use document::DocumentStore;
use key_value::KeyValueStore;
use std::path::PathBuf;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Backends detected by [`Capabilities::probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub document_store: bool,
    pub key_value: bool,
}

impl Capabilities {
    /// Detect which backends are usable for `config`.
    ///
    /// A backend is usable when it is enabled and the data directory exists or
    /// can be created.
    pub fn probe(config: &Config) -> Self {
        let dir_ready = match std::fs::create_dir_all(&config.data_dir) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    "Data directory {:?} is not usable: {}",
                    config.data_dir,
                    err
                );
                false
            }
        };
        Self {
            document_store: dir_ready && config.document_store_enabled,
            key_value: dir_ready && config.key_value_enabled,
        }
    }
}

/// Which backend serves a [`SnippetStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    KeyValue,
    Document,
}

/// Result of the one-time legacy migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The document store already held rows; nothing was touched.
    AlreadyPopulated,
    /// No legacy snippets existed.
    NothingToMigrate,
    /// This many snippets were copied and the legacy key removed.
    Migrated(usize),
}

/// Run blocking backend work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

/// Snippets stored as one JSON array under [`SNIPPETS_STORAGE_KEY`].
pub struct KeyValueBackend {
    store: Arc<KeyValueStore>,
}

impl KeyValueBackend {
    fn new(store: KeyValueStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    async fn load_all(&self) -> Result<Vec<Snippet>, AppError> {
        let store = self.store.clone();
        let value = blocking(move || store.get(SNIPPETS_STORAGE_KEY)).await?;
        let mut snippets = read_legacy_value(value);
        sort_by_recency(&mut snippets);
        Ok(snippets)
    }

    async fn save_all(&self, snippets: Vec<Snippet>) -> Result<(), AppError> {
        let store = self.store.clone();
        let value = serde_json::to_value(&snippets)?;
        blocking(move || store.set(SNIPPETS_STORAGE_KEY, value)).await
    }
}

fn read_legacy_value(value: Option<serde_json::Value>) -> Vec<Snippet> {
    let Some(value) = value else {
        return Vec::new();
    };
    snippets_from_value(&value)
        .into_iter()
        .filter(Snippet::is_valid)
        .collect()
}

/// redb-backed snippets, plus the legacy store it migrates from.
pub struct DocumentBackend {
    path: PathBuf,
    handle: OnceCell<Arc<DocumentStore>>,
    legacy: Option<Arc<KeyValueStore>>,
    migration: OnceCell<MigrationOutcome>,
    #[cfg(test)]
    migration_runs: AtomicUsize,
}

impl DocumentBackend {
    fn new(path: PathBuf, legacy: Option<KeyValueStore>) -> Self {
        Self {
            path,
            handle: OnceCell::new(),
            legacy: legacy.map(Arc::new),
            migration: OnceCell::new(),
            #[cfg(test)]
            migration_runs: AtomicUsize::new(0),
        }
    }

    /// Open the database on first use and reuse the handle afterwards.
    async fn store(&self) -> Result<Arc<DocumentStore>, AppError> {
        let store = self
            .handle
            .get_or_try_init(|| async {
                let path = self.path.clone();
                tracing::debug!("Opening document store at {:?}", path);
                blocking(move || DocumentStore::open(&path).map(Arc::new)).await
            })
            .await?;
        Ok(store.clone())
    }

    async fn ensure_migrated(&self) -> Result<MigrationOutcome, AppError> {
        self.migration
            .get_or_try_init(|| self.migrate())
            .await
            .copied()
    }

    /// Run the migration as one blocking job.
    ///
    /// The job is detached from the caller: dropping the awaiting future does
    /// not stop it between the document commit and the legacy delete.
    async fn migrate(&self) -> Result<MigrationOutcome, AppError> {
        #[cfg(test)]
        self.migration_runs.fetch_add(1, Ordering::SeqCst);
        let store = self.store().await?;
        let legacy = self.legacy.clone();
        blocking(move || migrate_legacy(&store, legacy.as_deref())).await
    }

    async fn load_all(&self) -> Result<Vec<Snippet>, AppError> {
        self.ensure_migrated().await?;
        let store = self.store().await?;
        blocking(move || store.load_all()).await
    }

    async fn save_all(&self, snippets: Vec<Snippet>) -> Result<(), AppError> {
        let store = self.store().await?;
        blocking(move || store.replace_all(&snippets)).await
    }
}

fn migrate_legacy(
    store: &DocumentStore,
    legacy: Option<&KeyValueStore>,
) -> Result<MigrationOutcome, AppError> {
    if !store.is_empty()? {
        if let Some(legacy) = legacy {
            finish_interrupted_migration(store, legacy)?;
        }
        tracing::debug!("Document store already populated; skipping migration");
        return Ok(MigrationOutcome::AlreadyPopulated);
    }

    let Some(legacy) = legacy else {
        return Ok(MigrationOutcome::NothingToMigrate);
    };
    let mut snippets = read_legacy_value(legacy.get(SNIPPETS_STORAGE_KEY)?);
    if snippets.is_empty() {
        tracing::debug!("No legacy snippets to migrate");
        return Ok(MigrationOutcome::NothingToMigrate);
    }
    sort_by_recency(&mut snippets);
    dedupe_by_id(&mut snippets);
    let count = snippets.len();

    // The legacy key is only removed once the replace has committed.
    store.replace_all(&snippets)?;
    legacy.remove(SNIPPETS_STORAGE_KEY)?;

    tracing::info!(
        "Migrated {} snippet(s) from key-value storage into the document store",
        count
    );
    Ok(MigrationOutcome::Migrated(count))
}

/// Delete a legacy key left behind after its snippets were already committed.
///
/// The key is only removed when every legacy id exists in the document store.
fn finish_interrupted_migration(
    store: &DocumentStore,
    legacy: &KeyValueStore,
) -> Result<(), AppError> {
    let Some(value) = legacy.get(SNIPPETS_STORAGE_KEY)? else {
        return Ok(());
    };
    let snippets = read_legacy_value(Some(value));
    if snippets.is_empty() {
        return Ok(());
    }
    let stored = store.ids()?;
    if snippets.iter().all(|snippet| stored.contains(&snippet.id)) {
        legacy.remove(SNIPPETS_STORAGE_KEY)?;
        tracing::info!(
            "Removed legacy snippet key left over from an earlier migration ({} snippet(s))",
            snippets.len()
        );
    }
    Ok(())
}

/// One of the two persistence backends.
pub enum Backend {
    KeyValue(KeyValueBackend),
    Document(DocumentBackend),
}

impl Backend {
    fn kind(&self) -> BackendKind {
        match self {
            Backend::KeyValue(_) => BackendKind::KeyValue,
            Backend::Document(_) => BackendKind::Document,
        }
    }

    async fn load_all(&self) -> Result<Vec<Snippet>, AppError> {
        match self {
            Backend::KeyValue(backend) => backend.load_all().await,
            Backend::Document(backend) => backend.load_all().await,
        }
    }

    async fn save_all(&self, snippets: Vec<Snippet>) -> Result<(), AppError> {
        match self {
            Backend::KeyValue(backend) => backend.save_all(snippets).await,
            Backend::Document(backend) => backend.save_all(snippets).await,
        }
    }
}

/// Entry point for loading and saving the snippet collection.
pub struct SnippetStore {
    backend: Option<Backend>,
}

impl SnippetStore {
    /// Probe capabilities for `config` and select a backend.
    ///
    /// Never fails: when no backend is usable, every later operation returns
    /// [`AppError::BackendUnavailable`].
    pub fn open(config: &Config) -> Self {
        let capabilities = Capabilities::probe(config);
        let key_value = capabilities
            .key_value
            .then(|| KeyValueStore::new(&config.data_dir));

        let backend = if capabilities.document_store {
            let path = config.data_dir.join(DOCUMENT_STORE_FILE_NAME);
            Some(Backend::Document(DocumentBackend::new(path, key_value)))
        } else {
            key_value.map(|store| Backend::KeyValue(KeyValueBackend::new(store)))
        };

        match backend.as_ref().map(Backend::kind) {
            Some(kind) => tracing::info!("Snippet storage using {:?} backend", kind),
            None => tracing::warn!("No snippet storage backend available"),
        }
        Self { backend }
    }

    /// Open a store configured from the environment.
    pub fn from_env() -> Self {
        Self::open(&Config::from_env())
    }

    /// Backend selected at open time, if any.
    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.as_ref().map(Backend::kind)
    }

    fn backend(&self) -> Result<&Backend, AppError> {
        self.backend.as_ref().ok_or_else(|| {
            AppError::BackendUnavailable(
                "neither the document store nor key-value storage is available".to_string(),
            )
        })
    }

    /// Load every persisted snippet, most recently updated first.
    ///
    /// Malformed persisted records are dropped silently.
    ///
    /// # Errors
    /// Returns [`AppError::BackendUnavailable`] without a backend, or the
    /// backend's I/O error.
    pub async fn load_snippets(&self) -> Result<Vec<Snippet>, AppError> {
        let snippets = self.backend()?.load_all().await?;
        tracing::debug!("Loaded {} snippet(s)", snippets.len());
        Ok(snippets)
    }

    /// Replace the persisted collection with `snippets`.
    ///
    /// Records with blank code are never persisted.
    ///
    /// # Errors
    /// Returns [`AppError::BackendUnavailable`] without a backend, or the
    /// backend's I/O error. A failed save leaves the previous collection.
    pub async fn save_snippets(&self, snippets: &[Snippet]) -> Result<(), AppError> {
        let backend = self.backend()?;
        let mut valid: Vec<Snippet> = snippets.iter().filter(|s| s.is_valid()).cloned().collect();
        let dropped = snippets.len() - valid.len();
        if dropped > 0 {
            tracing::warn!("Refusing to persist {} snippet(s) without code", dropped);
        }
        sort_by_recency(&mut valid);
        let duplicates = dedupe_by_id(&mut valid);
        if duplicates > 0 {
            tracing::warn!("Dropped {} older duplicate snippet id(s) before saving", duplicates);
        }
        tracing::debug!("Saving {} snippet(s)", valid.len());
        backend.save_all(valid).await
    }

    /// Outcome of the legacy migration, once it has run.
    pub fn migration_outcome(&self) -> Option<MigrationOutcome> {
        match self.backend.as_ref()? {
            Backend::Document(backend) => backend.migration.get().copied(),
            Backend::KeyValue(_) => None,
        }
    }
}

#[cfg(test)]
impl SnippetStore {
    pub(crate) async fn document_store(&self) -> Arc<DocumentStore> {
        match self.backend.as_ref() {
            Some(Backend::Document(backend)) => backend.store().await.expect("open document store"),
            _ => panic!("store is not using the document backend"),
        }
    }

    pub(crate) fn migration_runs(&self) -> usize {
        match self.backend.as_ref() {
            Some(Backend::Document(backend)) => backend.migration_runs.load(Ordering::SeqCst),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests;
