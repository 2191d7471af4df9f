use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use async_trait::async_trait;
use tokio::sync::Mutex;
use crate::{Result, Error, KeyValueStore};
use crate::engine::Persistence;

type StoreData = BTreeMap<String, String>;

/// In-memory string map implementing [`KeyValueStore`], optionally backed by
/// [`Persistence`].
///
/// Writers are serialized. Each write computes the next snapshot, persists it,
/// and only then publishes it to readers, so a failed disk write leaves both
/// memory and disk at the previous state.
pub struct MemKvStore {
    data: RwLock<StoreData>,
    persistence: Option<Arc<Persistence>>,
    write_lock: Mutex<()>,
}

impl MemKvStore {
    pub fn new(initial_data: StoreData, persistence: Option<Arc<Persistence>>) -> Self {
        Self {
            data: RwLock::new(initial_data),
            persistence,
            write_lock: Mutex::new(()),
        }
    }

    /// Loads the persisted snapshot and returns a store writing back to it.
    pub fn open(persistence: Arc<Persistence>) -> Result<Self> {
        let initial_data = persistence.load()?;
        log::info!("Loaded {} keys from {:?}", initial_data.len(), persistence.path());
        Ok(Self::new(initial_data, Some(persistence)))
    }

    /// Applies `mutate` under the write lock. When it reports no change,
    /// nothing is persisted or published.
    async fn commit<F>(&self, label: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut StoreData) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut next = self.data.read().unwrap().clone();
        if !mutate(&mut next) {
            return Ok(());
        }

        if let Some(p) = &self.persistence {
            let p = p.clone();
            let snapshot = next.clone();
            tokio::task::spawn_blocking(move || p.save(&snapshot))
                .await
                .map_err(|e| Error::Internal(e.to_string()))?
                .map_err(|e| Error::WriteFault {
                    key: label.to_string(),
                    reason: e.to_string(),
                })?;
        }

        *self.data.write().unwrap() = next;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let data = self.data.read().unwrap();
        Ok(data.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.commit(key, |data| {
            data.insert(key.to_string(), value);
            true
        })
        .await
    }

    async fn multi_set(&self, pairs: Vec<(String, String)>) -> Result<()> {
        let label = pairs.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>().join(",");
        self.commit(&label, |data| {
            data.extend(pairs);
            true
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.commit(key, |data| data.remove(key).is_some()).await
    }

    async fn multi_remove(&self, keys: &[&str]) -> Result<()> {
        let label = keys.join(",");
        self.commit(&label, |data| {
            let mut changed = false;
            for key in keys {
                changed |= data.remove(*key).is_some();
            }
            changed
        })
        .await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let data = self.data.read().unwrap();
        Ok(data.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_memstore_get_set() {
        let store = MemKvStore::new(BTreeMap::new(), None);
        store.set("k1", "v1".to_string()).await.unwrap();

        assert_eq!(store.get("k1").await.unwrap(), Some("v1".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memstore_remove_is_idempotent() {
        let store = MemKvStore::new(BTreeMap::new(), None);
        store.set("k1", "v1".to_string()).await.unwrap();
        store.remove("k1").await.unwrap();
        store.remove("k1").await.unwrap();

        assert_eq!(store.get("k1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multi_set_and_multi_remove() {
        let store = MemKvStore::new(BTreeMap::new(), None);
        store
            .multi_set(vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
                ("c".to_string(), "3".to_string()),
            ])
            .await
            .unwrap();
        assert_eq!(store.keys().await.unwrap(), vec!["a", "b", "c"]);

        store.multi_remove(&["a", "c", "absent"]).await.unwrap();
        assert_eq!(store.keys().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_persisted_store_reopens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv_store.json");

        {
            let store = MemKvStore::open(Arc::new(Persistence::new(&path).unwrap())).unwrap();
            store.set("stored_gestures", "[1,2]".to_string()).await.unwrap();
        }

        let reopened = MemKvStore::open(Arc::new(Persistence::new(&path).unwrap())).unwrap();
        assert_eq!(reopened.get("stored_gestures").await.unwrap(), Some("[1,2]".to_string()));
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_memory_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv_store.json");
        let persistence = Arc::new(Persistence::new(&path).unwrap());
        let store = MemKvStore::new(BTreeMap::new(), Some(persistence));
        store.set("k", "old".to_string()).await.unwrap();

        // The temp file cannot be created once the directory is gone.
        std::fs::remove_dir_all(dir.path()).unwrap();

        let res = store.set("k", "new".to_string()).await;
        assert!(matches!(res, Err(Error::WriteFault { .. })));
        assert_eq!(store.get("k").await.unwrap(), Some("old".to_string()));
    }

    #[tokio::test]
    async fn test_removing_absent_keys_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv_store.json");
        let store = MemKvStore::new(BTreeMap::new(), Some(Arc::new(Persistence::new(&path).unwrap())));

        store.remove("missing").await.unwrap();
        store.multi_remove(&["a", "b"]).await.unwrap();
        assert!(!path.exists());

        store.set("k", "v".to_string()).await.unwrap();
        std::fs::remove_dir_all(dir.path()).unwrap();

        // Nothing to remove, so the unwritable directory is never touched.
        store.remove("missing").await.unwrap();
        assert!(matches!(store.remove("k").await, Err(Error::WriteFault { .. })));
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_concurrent_set_and_remove_settle() {
        let store = Arc::new(MemKvStore::new(BTreeMap::new(), None));
        let tasks: Vec<_> = (0..40)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let key = format!("k{}", i % 4);
                    if i % 2 == 0 {
                        store.set(&key, i.to_string()).await
                    } else {
                        store.remove(&key).await
                    }
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        for key in store.keys().await.unwrap() {
            assert!(store.get(&key).await.unwrap().is_some());
        }
    }
}
