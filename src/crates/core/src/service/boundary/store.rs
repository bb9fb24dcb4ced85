use super::identity::TurnIdentity;
use crate::infrastructure::storage::KeyValueStore;
use crate::util::errors::PowerToolsResult;
use indexmap::IndexSet;
use log::{debug, error};
use std::sync::Arc;

/// Persisted set of boundary-flagged turn identities.
///
/// Every operation reads and rewrites the whole set. Storage faults never
/// escape: reads fall back to an empty set and failed toggles report `false`.
#[derive(Clone)]
pub struct BoundaryStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl BoundaryStore {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Loads the set, deduplicating the persisted list.
    pub async fn load(&self) -> IndexSet<TurnIdentity> {
        match self.try_load().await {
            Ok(set) => {
                debug!("Loaded boundaries: count={}", set.len());
                set
            }
            Err(e) => {
                error!("Failed to load boundaries: key={}, error={}", self.key, e);
                IndexSet::new()
            }
        }
    }

    async fn try_load(&self) -> PowerToolsResult<IndexSet<TurnIdentity>> {
        let Some(value) = self.store.get(&self.key).await? else {
            return Ok(IndexSet::new());
        };
        let list: Vec<TurnIdentity> = serde_json::from_value(value)?;
        Ok(list.into_iter().collect())
    }

    pub async fn is_boundary(&self, id: &TurnIdentity) -> bool {
        if id.is_empty() {
            return false;
        }
        self.load().await.contains(id)
    }

    /// Flips the flag for `id` and returns the new state.
    pub async fn toggle(&self, id: &TurnIdentity) -> bool {
        if id.is_empty() {
            return false;
        }
        match self.try_toggle(id).await {
            Ok(state) => state,
            Err(e) => {
                error!("Failed to toggle boundary: id={}, error={}", id, e);
                false
            }
        }
    }

    /// Starts from [`load`](Self::load), so an unreadable payload is replaced.
    async fn try_toggle(&self, id: &TurnIdentity) -> PowerToolsResult<bool> {
        let mut set = self.load().await;
        let new_state = !set.contains(id);
        if new_state {
            set.insert(id.clone());
            debug!("Added boundary: id={}", id);
        } else {
            set.shift_remove(id);
            debug!("Removed boundary: id={}", id);
        }
        let list: Vec<&TurnIdentity> = set.iter().collect();
        self.store.set(&self.key, serde_json::to_value(list)?).await?;
        Ok(new_state)
    }

    pub async fn clear_all(&self) {
        match self.store.remove(&self.key).await {
            Ok(()) => debug!("Cleared all boundaries: key={}", self.key),
            Err(e) => error!("Failed to clear boundaries: key={}, error={}", self.key, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::MemoryStore;
    use crate::util::errors::PowerToolsError;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn store() -> (Arc<MemoryStore>, BoundaryStore) {
        let backing = Arc::new(MemoryStore::new());
        let boundaries = BoundaryStore::new(backing.clone(), "boundaries");
        (backing, boundaries)
    }

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> PowerToolsResult<Option<Value>> {
            Err(PowerToolsError::storage("disk on fire"))
        }

        async fn set(&self, _key: &str, _value: Value) -> PowerToolsResult<()> {
            Err(PowerToolsError::storage("disk on fire"))
        }

        async fn remove(&self, _key: &str) -> PowerToolsResult<()> {
            Err(PowerToolsError::storage("disk on fire"))
        }
    }

    #[tokio::test]
    async fn toggle_then_clear() {
        let (_, boundaries) = store();
        let t = TurnIdentity::from("turn-t");

        assert!(boundaries.toggle(&t).await);
        assert!(boundaries.is_boundary(&t).await);
        boundaries.clear_all().await;
        assert!(!boundaries.is_boundary(&t).await);
    }

    #[tokio::test]
    async fn double_toggle_restores_state() {
        let (_, boundaries) = store();
        for raw in ["a", "b", "turn_1x_0_"] {
            let id = TurnIdentity::from(raw);
            let before = boundaries.is_boundary(&id).await;
            boundaries.toggle(&id).await;
            boundaries.toggle(&id).await;
            assert_eq!(boundaries.is_boundary(&id).await, before);
        }
    }

    #[tokio::test]
    async fn persisted_duplicates_are_collapsed() {
        let (backing, boundaries) = store();
        backing.set("boundaries", json!(["a", "b", "a"])).await.unwrap();

        let set = boundaries.load().await;
        assert_eq!(set.len(), 2);

        // Turning "b" off rewrites the list without the duplicate.
        assert!(!boundaries.toggle(&TurnIdentity::from("b")).await);
        assert_eq!(backing.get("boundaries").await.unwrap(), Some(json!(["a"])));
    }

    #[tokio::test]
    async fn empty_identity_is_never_a_boundary() {
        let (backing, boundaries) = store();
        let empty = TurnIdentity::from("");
        assert!(!boundaries.toggle(&empty).await);
        assert!(!boundaries.is_boundary(&empty).await);
        assert_eq!(backing.get("boundaries").await.unwrap(), None);
    }

    #[tokio::test]
    async fn storage_faults_fall_back_to_defaults() {
        let boundaries = BoundaryStore::new(Arc::new(BrokenStore), "boundaries");
        let id = TurnIdentity::from("x");

        assert!(boundaries.load().await.is_empty());
        assert!(!boundaries.is_boundary(&id).await);
        assert!(!boundaries.toggle(&id).await);
        boundaries.clear_all().await;
    }

    #[tokio::test]
    async fn malformed_payload_reads_as_empty() {
        let (backing, boundaries) = store();
        backing.set("boundaries", json!({"not": "a list"})).await.unwrap();
        assert!(boundaries.load().await.is_empty());
    }

    #[tokio::test]
    async fn toggle_overwrites_malformed_payload() {
        let (backing, boundaries) = store();
        backing.set("boundaries", json!({"not": "a list"})).await.unwrap();
        let id = TurnIdentity::from("x");

        assert!(boundaries.toggle(&id).await);
        assert_eq!(backing.get("boundaries").await.unwrap(), Some(json!(["x"])));
        assert!(boundaries.is_boundary(&id).await);
    }
}
