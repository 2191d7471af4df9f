use std::collections::BTreeMap;
use std::sync::Arc;
use async_trait::async_trait;
use crate::engine::{vault, MemKvStore, Persistence};
use crate::{KeyValueStore, Result, SecureStore};

/// Encrypted [`SecureStore`] backed by a private [`MemKvStore`].
///
/// Values are sealed with [`vault::encrypt`] before they reach the map, so the
/// backing file only ever holds hex ciphertext. The map is owned by the vault
/// and is never shared with the data collections.
pub struct VaultStore {
    inner: MemKvStore,
    master_key: Vec<u8>,
}

impl VaultStore {
    /// An in-memory vault, mostly useful for tests.
    pub fn in_memory(master_key: &[u8]) -> Self {
        Self {
            inner: MemKvStore::new(BTreeMap::new(), None),
            master_key: master_key.to_vec(),
        }
    }

    /// Opens a vault persisted through `persistence`.
    pub fn open(persistence: Arc<Persistence>, master_key: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: MemKvStore::open(persistence)?,
            master_key: master_key.to_vec(),
        })
    }

    /// Raw ciphertext as stored, for inspection.
    pub async fn raw(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }
}

#[async_trait]
impl SecureStore for VaultStore {
    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let cipher_hex = vault::encrypt(value, &self.master_key)?;
        self.inner.set(key, cipher_hex).await
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        match self.inner.get(key).await? {
            Some(cipher_hex) => vault::decrypt(&cipher_hex, &self.master_key).map(Some),
            None => Ok(None),
        }
    }

    async fn delete_item(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const KEY: &[u8; 32] = b"thisis32byteslongsecretkey123456";

    #[tokio::test]
    async fn test_vault_round_trip_is_encrypted_at_rest() {
        let store = VaultStore::in_memory(KEY);
        store.set_item("api_token", "topsecret").await.unwrap();

        assert_eq!(store.get_item("api_token").await.unwrap(), Some("topsecret".to_string()));

        let raw = store.raw("api_token").await.unwrap().unwrap();
        assert_ne!(raw, "topsecret");
        assert!(hex::decode(&raw).is_ok());
    }

    #[tokio::test]
    async fn test_vault_delete_and_missing() {
        let store = VaultStore::in_memory(KEY);
        assert_eq!(store.get_item("nope").await.unwrap(), None);

        store.set_item("k", "v").await.unwrap();
        store.delete_item("k").await.unwrap();
        store.delete_item("k").await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_vault_persists_ciphertext_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secure_store.json");

        {
            let store = VaultStore::open(Arc::new(Persistence::new(&path).unwrap()), KEY).unwrap();
            store.set_item("password", "hunter2").await.unwrap();
        }

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(!on_disk.contains("hunter2"));

        let reopened = VaultStore::open(Arc::new(Persistence::new(&path).unwrap()), KEY).unwrap();
        assert_eq!(reopened.get_item("password").await.unwrap(), Some("hunter2".to_string()));
    }
}
