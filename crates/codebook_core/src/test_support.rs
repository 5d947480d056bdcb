//! Shared test-only helpers for codebook_core.

use crate::config::Config;
use crate::constants::SNIPPETS_STORAGE_KEY;
use crate::models::snippet::Snippet;
use crate::storage::key_value::KeyValueStore;
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

/// Process-wide lock serializing tests that mutate environment variables.
pub(crate) fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

#[allow(unused_unsafe)]
fn write_env(key: &str, value: Option<&str>) {
    // SAFETY: callers hold `env_lock` while tests mutate the environment.
    unsafe {
        match value {
            Some(value) => std::env::set_var(key, value),
            None => std::env::remove_var(key),
        }
    }
}

/// Sets or clears an environment variable and restores the old value on drop.
pub(crate) struct EnvGuard {
    key: String,
    previous: Option<String>,
}

impl EnvGuard {
    pub(crate) fn set(key: &str, value: &str) -> Self {
        Self::replace(key, Some(value))
    }

    pub(crate) fn remove(key: &str) -> Self {
        Self::replace(key, None)
    }

    fn replace(key: &str, value: Option<&str>) -> Self {
        let previous = std::env::var(key).ok();
        write_env(key, value);
        Self {
            key: key.to_string(),
            previous,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        write_env(&self.key, self.previous.as_deref());
    }
}

/// Creates an isolated data directory with both backends enabled.
///
/// Keep the [`TempDir`] alive for the full test to preserve the backing files.
pub(crate) fn setup_temp_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("temp dir");
    let config = Config::at(temp_dir.path().join("data"));
    (config, temp_dir)
}

/// A valid snippet with fixed metadata.
pub(crate) fn sample_snippet(id: &str, updated_at: i64) -> Snippet {
    Snippet {
        id: id.to_string(),
        title: format!("Snippet {}", id),
        code: format!("echo {}", id),
        category: "Shell".to_string(),
        language: "bash".to_string(),
        created_at: updated_at,
        updated_at,
    }
}

/// Legacy key-value store for `config`.
pub(crate) fn legacy_store(config: &Config) -> KeyValueStore {
    std::fs::create_dir_all(&config.data_dir).expect("create data dir");
    KeyValueStore::new(&config.data_dir)
}

/// Write `snippets` under the legacy key, as the old backend did.
pub(crate) fn seed_legacy(config: &Config, snippets: &[Snippet]) {
    let value = serde_json::to_value(snippets).expect("serialize legacy snippets");
    legacy_store(config)
        .set(SNIPPETS_STORAGE_KEY, value)
        .expect("seed legacy snippets");
}
