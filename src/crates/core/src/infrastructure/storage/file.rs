//! JSON-file backed key-value store
//!
//! All keys live in one JSON object. Every write rewrites the whole file through
//! a temporary sibling and a rename.

use super::kv::KeyValueStore;
use crate::util::errors::{PowerToolsError, PowerToolsResult};
use async_trait::async_trait;
use log::debug;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles against the file.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> PowerToolsResult<Map<String, Value>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            other => Err(PowerToolsError::storage(format!(
                "Store file is not a JSON object: path={}, found={}",
                self.path.display(),
                type_name(&other)
            ))),
        }
    }

    async fn write_all(&self, map: Map<String, Value>) -> PowerToolsResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let serialized = serde_json::to_string_pretty(&Value::Object(map))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serialized.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Store file written: path={}", self.path.display());
        Ok(())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> PowerToolsResult<Option<Value>> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> PowerToolsResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_all().await?;
        map.insert(key.to_string(), value);
        self.write_all(map).await
    }

    async fn remove(&self, key: &str) -> PowerToolsResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_all().await?;
        if map.remove(key).is_some() {
            self.write_all(map).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("store.json"));
        assert_eq!(store.get("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn values_survive_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = JsonFileStore::new(&path);
        store.set("boundaries", json!(["a", "b"])).await.unwrap();
        store.set("clicks", json!(4)).await.unwrap();
        store.remove("clicks").await.unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get("boundaries").await.unwrap(), Some(json!(["a", "b"])));
        assert_eq!(reopened.get("clicks").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "[1, 2]").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.get("x").await, Err(PowerToolsError::Storage(_))));
    }
}
