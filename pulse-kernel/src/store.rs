//! Stockage local des adresses résolues (clés `scu` / `mu`)
//!
//! Équivalent du stockage local d'un navigateur : synchrone, clé/valeur,
//! persisté en JSON sur disque pour `FileStore`.

use crate::error::{PulseError, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub trait PersistedStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        {
            let mut map = store.values.lock();
            for (k, v) in values {
                map.insert(k.into(), v.into());
            }
        }
        store
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl PersistedStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Store JSON sur disque, relu à l'ouverture puis gardé en cache mémoire
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let cache = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!("[store] opened {} ({} keys)", path.display(), cache.len());
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    /// Emplacement par défaut : <config_dir>/pulse/connections.json
    pub fn default_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| PulseError::Store("could not find config directory".into()))?;
        path.push("pulse");
        path.push("connections.json");
        Ok(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl PersistedStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut cache = self.cache.lock();
        cache.insert(key.to_string(), value.to_string());
        self.flush(&cache)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut cache = self.cache.lock();
        if cache.remove(key).is_some() {
            self.flush(&cache)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("connections.json");

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("scu"), None);
        store.set("scu", "http://sc:33333/api/").unwrap();
        store.set("mu", "!").unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("scu").as_deref(), Some("http://sc:33333/api/"));
        assert_eq!(reopened.get("mu").as_deref(), Some("!"));

        reopened.remove("scu").unwrap();
        let again = FileStore::open(&path).unwrap();
        assert_eq!(again.get("scu"), None);
        assert_eq!(again.get("mu").as_deref(), Some("!"));
    }

    #[test]
    fn test_file_store_rejects_corrupted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connections.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(FileStore::open(&path), Err(PulseError::Json(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::with_values([("scu", "http://a")]);
        assert_eq!(store.get("scu").as_deref(), Some("http://a"));
        store.remove("scu").unwrap();
        assert!(store.is_empty());
    }
}
