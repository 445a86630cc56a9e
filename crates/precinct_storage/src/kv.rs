#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use precinct_contracts::UnixTimeMs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const STORE_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("value under '{key}' is unreadable: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("store schema version {found} is not supported")]
    UnsupportedSchema { found: u8 },
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Durable client-side key-value persistence. Values are opaque strings (JSON in practice).
pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Returns whether a value was present.
    fn clear(&self, key: &str) -> Result<bool, StorageError>;
}

impl<S: KvStore + ?Sized> KvStore for &S {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn clear(&self, key: &str) -> Result<bool, StorageError> {
        (**self).clear(key)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl KvStore for InMemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<bool, StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.remove(key).is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StoreDocument {
    schema_version: u8,
    entries: BTreeMap<String, StoreEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreEntry {
    value: String,
    updated_at_unix_ms: UnixTimeMs,
}

/// One JSON document on disk holding every key. Writes go through a temp file and a rename.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    path: PathBuf,
}

impl FileKvStore {
    pub fn default_local() -> Self {
        let path = env::var("PRECINCT_STORE_PATH")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_store_path);
        Self::for_path(path)
    }

    pub fn for_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Option<StoreDocument>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Some(StoreDocument::default()));
        }
        let doc = serde_json::from_str::<StoreDocument>(&raw)?;
        if doc.schema_version != STORE_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchema {
                found: doc.schema_version,
            });
        }
        Ok(Some(doc))
    }

    fn write_document(&self, doc: &StoreDocument) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_vec_pretty(doc)?;
        atomic_write(&self.path, &serialized)?;
        debug!(path = %self.path.display(), keys = doc.entries.len(), "client store written");
        Ok(())
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let Some(doc) = self.read_document()? else {
            return Ok(None);
        };
        Ok(doc.entries.get(key).map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut doc = self.read_document()?.unwrap_or_default();
        doc.schema_version = STORE_SCHEMA_VERSION;
        doc.entries.insert(
            key.to_string(),
            StoreEntry {
                value: value.to_string(),
                updated_at_unix_ms: UnixTimeMs::now(),
            },
        );
        self.write_document(&doc)
    }

    fn clear(&self, key: &str) -> Result<bool, StorageError> {
        let Some(mut doc) = self.read_document()? else {
            return Ok(false);
        };
        let removed = doc.entries.remove(key).is_some();
        if removed {
            doc.schema_version = STORE_SCHEMA_VERSION;
            self.write_document(&doc)?;
        }
        Ok(removed)
    }
}

fn default_store_path() -> PathBuf {
    if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg_config_home)
            .join("precinct")
            .join("client_store.json");
    }
    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("precinct")
            .join("client_store.json");
    }
    PathBuf::from(".precinct").join("client_store.json")
}

/// The store holds the session cookie, so the file is owner-only before it is renamed into place.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&tmp)?;
    file.write_all(data)?;
    file.flush()?;
    drop(file);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
    }
    fs::rename(tmp, path)?;
    Ok(())
}
