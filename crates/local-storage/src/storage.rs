//! Key/value backends the local dashboard store writes to

use parking_lot::{Mutex, RwLock};
use presto_shared::{map_presto_error, PrestoError, PrestoResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// String key/value storage in the style of the browser's `Storage`
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> PrestoResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> PrestoResult<()>;

    fn remove(&self, key: &str) -> PrestoResult<()>;

    fn keys(&self) -> PrestoResult<Vec<String>>;

    fn has(&self, key: &str) -> PrestoResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// JSON helpers available on every backend
pub trait JsonStorageExt: KeyValueStorage {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> PrestoResult<Option<T>> {
        match self.get(key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> PrestoResult<()> {
        let json = serde_json::to_string(value)?;
        self.set(key, &json)
    }
}

impl<S: KeyValueStorage + ?Sized> JsonStorageExt for S {}

impl<S: KeyValueStorage + ?Sized> KeyValueStorage for std::sync::Arc<S> {
    fn get(&self, key: &str) -> PrestoResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> PrestoResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> PrestoResult<()> {
        (**self).remove(key)
    }

    fn keys(&self) -> PrestoResult<Vec<String>> {
        (**self).keys()
    }
}

/// In-process storage, lost on drop
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> PrestoResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PrestoResult<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PrestoResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> PrestoResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// All entries in a single JSON object on disk
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> PrestoResult<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(PrestoError::storage(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn store(&self, entries: &BTreeMap<String, String>) -> PrestoResult<()> {
        let context = format!("cannot write {}", self.path.display());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            map_presto_error!(fs::create_dir_all(parent), Storage, context)?;
        }

        // write aside and rename so readers never see a torn file
        let staging = self.path.with_extension("tmp");
        let json = serde_json::to_string_pretty(entries)?;
        map_presto_error!(fs::write(&staging, json), Storage, context)?;
        map_presto_error!(fs::rename(&staging, &self.path), Storage, context)
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> PrestoResult<()> {
        let _guard = self.lock.lock();
        let mut entries = self.load()?;
        apply(&mut entries);
        self.store(&entries)
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> PrestoResult<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> PrestoResult<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> PrestoResult<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }

    fn keys(&self) -> PrestoResult<Vec<String>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        storage.set("a", "1").unwrap();
        storage.set("b", "2").unwrap();
        storage.remove("a").unwrap();

        assert_eq!(storage.get("a").unwrap(), None);
        assert!(storage.has("b").unwrap());
        assert_eq!(storage.keys().unwrap(), vec!["b"]);
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_json_helpers() {
        let storage = MemoryStorage::new();
        storage.set_json("d", &json!({ "x": [1, 2] })).unwrap();

        let value: serde_json::Value = storage.get_json("d").unwrap().unwrap();
        assert_eq!(value["x"][1], 2);
        assert!(storage.get_json::<serde_json::Value>("missing").unwrap().is_none());

        storage.set("broken", "{").unwrap();
        assert!(storage.get_json::<serde_json::Value>("broken").is_err());
    }

    #[test]
    fn test_file_storage_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dashboards.json");

        let storage = FileStorage::new(&path);
        assert!(storage.keys().unwrap().is_empty());
        storage.set("t", "{}").unwrap();
        storage.set("l", "{}").unwrap();
        storage.remove("t").unwrap();

        let reopened = FileStorage::new(&path);
        assert_eq!(reopened.keys().unwrap(), vec!["l"]);
        assert_eq!(reopened.get("l").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_file_storage_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboards.json");
        fs::write(&path, "not json").unwrap();

        assert!(FileStorage::new(&path).get("t").is_err());
    }
}
