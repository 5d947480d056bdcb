//! Configuration loading from environment variables.

use std::env;
use std::path::PathBuf;

/// Runtime configuration for Codebook storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding both backend files.
    pub data_dir: PathBuf,
    pub document_store_enabled: bool,
    pub key_value_enabled: bool,
}

const DATA_DIR_VAR: &str = "CODEBOOK_DATA_DIR";
const DISABLE_DOCUMENT_STORE_VAR: &str = "CODEBOOK_DISABLE_DOCUMENT_STORE";
const DISABLE_KEY_VALUE_VAR: &str = "CODEBOOK_DISABLE_KEY_VALUE";

fn home_dir() -> Option<PathBuf> {
    ["HOME", "USERPROFILE"].iter().find_map(|name| {
        env::var_os(name)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    })
}

/// `~/rest` resolves against the home directory; anything else is taken as-is.
fn data_dir_from(raw: &str) -> PathBuf {
    match (raw.strip_prefix("~/"), home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

/// Interpret a backend switch value.
///
/// `1`/`true`/`yes`/`on` enable it and `0`/`false`/`no`/`off` or an empty
/// value disable it, ignoring case and padding. Anything else is `None`.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn flag_set(name: &str) -> bool {
    env::var(name)
        .ok()
        .and_then(|value| parse_flag(&value))
        .unwrap_or(false)
}

impl Config {
    /// Read `CODEBOOK_DATA_DIR` and the two backend switches.
    ///
    /// Without a data dir the store lives in `~/.cache/codebook`, or under
    /// the working directory when no home is known.
    pub fn from_env() -> Self {
        let data_dir = match env::var(DATA_DIR_VAR) {
            Ok(raw) if !raw.trim().is_empty() => data_dir_from(raw.trim()),
            _ => home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".cache")
                .join("codebook"),
        };
        Self {
            data_dir,
            document_store_enabled: !flag_set(DISABLE_DOCUMENT_STORE_VAR),
            key_value_enabled: !flag_set(DISABLE_KEY_VALUE_VAR),
        }
    }

    /// Build a configuration rooted at `data_dir` with both backends enabled.
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            document_store_enabled: true,
            key_value_enabled: true,
        }
    }

    /// Disable the embedded document store, leaving only key-value storage.
    pub fn without_document_store(mut self) -> Self {
        self.document_store_enabled = false;
        self
    }

    /// Disable the key-value store.
    pub fn without_key_value(mut self) -> Self {
        self.key_value_enabled = false;
        self
    }
}
