//! Key-value persistence for client state.
//!
//! Everything the client remembers between runs (triggers, favorites, the
//! chatlog and link history) is a serialized blob under one named key.
//! `FileStore` keeps one `<key>.json` per key inside the profile directory.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

/// Raw string storage addressed by key
pub trait KeyValueStore {
    /// Read the blob stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the blob stored under `key`
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// Load a JSON value stored under `key`.
///
/// Absent and malformed data both come back as `None`; the latter is logged.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    let Some(raw) = store.get(key)? else {
        tracing::debug!("No stored value for '{}'", key);
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!("Ignoring malformed value for '{}': {}", key, e);
            Ok(None)
        }
    }
}

/// Serialize `value` as JSON and store it under `key` in one write
pub fn save_json<T: Serialize>(store: &mut dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)
        .with_context(|| format!("Failed to serialize value for '{}'", key))?;
    store.set(key, &raw)
}

/// Directory-backed store: key `triggers` lives in `<dir>/triggers.json`
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(contents))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        // Single replace: temp file then rename
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        fs::write(&tmp, value).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        tracing::debug!("Saved '{}' to {:?}", key, path);
        Ok(())
    }
}

/// In-process store for tests
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: std::collections::HashMap<String, String>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_get_set() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("triggers").unwrap(), None);

        store.set("triggers", "[]").unwrap();
        assert_eq!(store.get("triggers").unwrap().as_deref(), Some("[]"));

        store.set("triggers", "[1]").unwrap();
        assert_eq!(store.get("triggers").unwrap().as_deref(), Some("[1]"));
    }

    #[test]
    fn test_file_store_creates_dir_and_writes_key_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("default");
        let mut store = FileStore::new(&dir);

        assert_eq!(store.get("favorites").unwrap(), None);
        store.set("favorites", "[\"bbs.example.com\"]").unwrap();

        let on_disk = fs::read_to_string(dir.join("favorites.json")).unwrap();
        assert_eq!(on_disk, "[\"bbs.example.com\"]");
        assert!(!dir.join(".favorites.json.tmp").exists());
        assert_eq!(
            store.get("favorites").unwrap().as_deref(),
            Some("[\"bbs.example.com\"]")
        );
    }

    #[test]
    fn test_load_json_treats_malformed_as_absent() {
        let mut store = MemoryStore::new();
        store.set("favorites", "{not json").unwrap();

        let loaded: Option<Vec<String>> = load_json(&store, "favorites").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_json_round_trip() {
        let mut store = MemoryStore::new();
        let value = vec!["a".to_string(), "b".to_string()];
        save_json(&mut store, "favorites", &value).unwrap();

        let loaded: Option<Vec<String>> = load_json(&store, "favorites").unwrap();
        assert_eq!(loaded, Some(value));
    }
}
