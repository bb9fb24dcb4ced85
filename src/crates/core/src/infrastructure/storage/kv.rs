use crate::util::errors::PowerToolsResult;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

/// Asynchronous key-value store holding JSON values.
///
/// Implementations report faults as errors; callers decide whether to fall
/// back to a default.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> PowerToolsResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> PowerToolsResult<()>;

    async fn remove(&self, key: &str) -> PowerToolsResult<()>;
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> PowerToolsResult<Option<Value>> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: Value) -> PowerToolsResult<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> PowerToolsResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}
