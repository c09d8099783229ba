use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
    io::{self, BufReader},
    path::PathBuf,
};

use anyhow::Context;
use fs_err::File;
use log::{debug, warn};
use repeater_scraping_utils::fs_json_util::write_json;
use serde::{de::DeserializeOwned, Serialize};

/// String key-value storage, holding JSON-encoded values.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> anyhow::Result<()>;
    fn remove(&mut self, key: &str) -> anyhow::Result<()>;
    fn clear(&mut self) -> anyhow::Result<()>;
}

/// Lives only as long as the process.
#[derive(Default, Debug)]
pub struct MemoryStore {
    data: HashMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> anyhow::Result<()> {
        self.data.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        self.data.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> anyhow::Result<()> {
        self.data.clear();
        Ok(())
    }
}

/// A JSON object on disk, rewritten after every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    data: BTreeMap<String, String>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreLoadError> {
        let path = path.into();
        let data = match File::open(&path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Store {path:?} was not found.  Starting empty.");
                BTreeMap::new()
            }
            Err(e) => return Err(StoreLoadError::IOError(e)),
        };
        Ok(Self { path, data })
    }

    fn save(&self) -> anyhow::Result<()> {
        write_json(&self.path, &self.data)
            .with_context(|| format!("While saving the store to {:?}", self.path))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> anyhow::Result<()> {
        self.data.insert(key.to_owned(), value);
        self.save()
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        if self.data.remove(key).is_some() {
            self.save()?;
        }
        Ok(())
    }

    fn clear(&mut self) -> anyhow::Result<()> {
        self.data.clear();
        self.save()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreLoadError {
    #[error("An I/O error occurred when loading the store: {0:?}")]
    IOError(io::Error),
    #[error("The store json file is corrupted and could not be loaded: {0:?}")]
    JsonError(#[from] serde_json::Error),
}

/// Returns the stored value for `key`, or computes, stores and returns it.
///
/// A stored value that no longer parses as `T` is recomputed.
pub async fn get_or_insert_with<T, F, Fut>(
    store: &mut dyn KeyValueStore,
    key: &str,
    f: F,
) -> anyhow::Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    if let Some(stored) = store.get(key) {
        match serde_json::from_str(&stored) {
            Ok(value) => {
                debug!("Using stored value for {key:?}");
                return Ok(value);
            }
            Err(e) => warn!("Stored value for {key:?} is unreadable, refetching: {e}"),
        }
    }
    let value = f().await?;
    if let Err(e) = store.set(key, serde_json::to_string(&value)?) {
        warn!("Failed to store {key:?}: {e:#}");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{get_or_insert_with, FileStore, KeyValueStore, MemoryStore};

    #[tokio::test]
    async fn computes_once_then_reuses() {
        let mut store = MemoryStore::default();
        let mut calls = 0;
        for _ in 0..2 {
            let value: Value = get_or_insert_with(&mut store, "k", || {
                calls += 1;
                async { Ok(json!({"rptrs": []})) }
            })
            .await
            .unwrap();
            assert_eq!(value, json!({"rptrs": []}));
        }
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn failure_is_not_stored() {
        let mut store = MemoryStore::default();
        let res: anyhow::Result<Value> =
            get_or_insert_with(&mut store, "k", || async {
                Err::<Value, _>(anyhow::anyhow!("nope"))
            })
            .await;
        assert!(res.is_err());
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        {
            let mut store = FileStore::open(&path).unwrap();
            assert_eq!(store.get("a"), None);
            store.set("a", "1".to_owned()).unwrap();
            store.set("b", "2".to_owned()).unwrap();
            store.remove("b").unwrap();
        }
        let mut store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("a").as_deref(), Some("1"));
        assert_eq!(store.get("b"), None);
        store.clear().unwrap();
        assert_eq!(FileStore::open(&path).unwrap().get("a"), None);
    }
}
