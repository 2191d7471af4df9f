use log::{debug, error, info, warn};
use serde_json::Value;

use crate::service::{keys, DataStorageService, BACKUPS_DIR, EXPORTS_DIR};
use crate::{Error, Result};

impl DataStorageService {
    /// Replaces the cache entry.
    pub async fn set_cache(&self, value: &Value) -> bool {
        let res = match serde_json::to_string(value) {
            Ok(raw) => self.kv.set(keys::CACHE, raw).await,
            Err(e) => Err(e.into()),
        };
        match res {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to write {}: {}", keys::CACHE, e);
                false
            }
        }
    }

    /// The cache entry, or `None` if absent or unreadable.
    pub async fn get_cache(&self) -> Option<Value> {
        match self.kv.get(keys::CACHE).await {
            Ok(raw) => raw.and_then(|raw| serde_json::from_str(&raw).ok()),
            Err(e) => {
                warn!("Failed to read {}: {}", keys::CACHE, e);
                None
            }
        }
    }

    /// Removes the cache entry. Clearing an absent cache is a no-op.
    pub async fn clear_cache(&self) -> Result<()> {
        self.kv.remove(keys::CACHE).await?;
        debug!("Cleared {}", keys::CACHE);
        Ok(())
    }

    /// Removes every collection and deletes all export and backup files.
    ///
    /// Irreversible. The result reflects only the key-value removal: leftover
    /// files are logged, not reported.
    pub async fn clear_all_data(&self) -> bool {
        let removed = {
            let _gestures = self.gestures.lock().await;
            let _sessions = self.sessions.lock().await;
            let _points = self.data_points.lock().await;
            let _history = self.export_history.lock().await;
            let _metadata = self.metadata_lock.lock().await;
            self.kv.multi_remove(&keys::COLLECTIONS).await
        };

        let mut deleted = 0;
        for dir in [EXPORTS_DIR, BACKUPS_DIR] {
            deleted += self.clear_directory(&self.document_path(dir)).await;
        }

        match removed {
            Ok(()) => {
                info!("Cleared all collections and {} file(s)", deleted);
                true
            }
            Err(e) => {
                error!("Failed to clear collections: {}", e);
                false
            }
        }
    }

    async fn clear_directory(&self, dir: &str) -> usize {
        let names = match self.files.read_dir(dir).await {
            Ok(names) => names,
            Err(Error::FileFault { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} does not exist yet, nothing to delete", dir);
                return 0;
            }
            Err(e) => {
                warn!("Could not list {}: {}", dir, e);
                return 0;
            }
        };

        let mut deleted = 0;
        for name in names {
            let path = format!("{}{}", dir, name);
            match self.files.delete(&path).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!("Could not delete {}: {}", path, e),
            }
        }
        deleted
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{MemFileStore, MemKvStore};
    use crate::service::{keys, DataStorageService};
    use crate::KeyValueStore;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cache_round_trip_and_clear() {
        let kv = Arc::new(MemKvStore::new(BTreeMap::new(), None));
        let service = DataStorageService::new(kv.clone(), Arc::new(MemFileStore::new()));

        assert!(service.set_cache(&json!({"lastScreen": "record"})).await);
        assert_eq!(service.get_cache().await, Some(json!({"lastScreen": "record"})));

        service.clear_cache().await.unwrap();
        service.clear_cache().await.unwrap();
        assert_eq!(kv.get(keys::CACHE).await.unwrap(), None);
        assert_eq!(service.get_cache().await, None);
    }

    #[tokio::test]
    async fn test_clear_all_keeps_cache() {
        let kv = Arc::new(MemKvStore::new(BTreeMap::new(), None));
        let service = DataStorageService::new(kv.clone(), Arc::new(MemFileStore::new()));
        kv.set(keys::GESTURES, "[]".to_string()).await.unwrap();
        assert!(service.set_cache(&json!(1)).await);

        assert!(service.clear_all_data().await);
        assert_eq!(kv.keys().await.unwrap(), vec![keys::CACHE.to_string()]);
    }
}
