use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use crate::engine::{vault, LocalFileStore, MemKvStore, Persistence, VaultStore};
use crate::service::{DataStorageService, KV_STORAGE_FILE};
use crate::Result;

/// Environment variable naming the data directory.
pub const DATA_DIR_ENV: &str = "GESTURE_STORE_DATA_DIR";
/// Environment variable holding the hex-encoded 32-byte secure-store key.
pub const MASTER_KEY_ENV: &str = "GESTURE_STORE_MASTER_KEY";
/// File holding the encrypted secure store, inside the data directory.
pub const SECURE_STORE_FILE: &str = "secure_store.json";

const DEFAULT_DATA_DIR: &str = "data";

/// Where the store lives and how secrets are sealed.
#[derive(Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub master_key: Option<Vec<u8>>,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("data_dir", &self.data_dir)
            .field("master_key", &self.master_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl StorageConfig {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            master_key: None,
        }
    }

    /// Reads [`DATA_DIR_ENV`] (default `data`) and [`MASTER_KEY_ENV`].
    ///
    /// A master key that is set but malformed is an error, not a silently
    /// disabled secure store.
    pub fn from_env() -> Result<Self> {
        let data_dir = env::var(DATA_DIR_ENV)
            .ok()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());

        let config = Self::new(data_dir);
        match env::var(MASTER_KEY_ENV) {
            Ok(key) if !key.is_empty() => config.with_master_key_hex(&key),
            _ => Ok(config),
        }
    }

    pub fn with_master_key_hex(mut self, key_hex: &str) -> Result<Self> {
        self.master_key = Some(vault::parse_key(key_hex)?);
        Ok(self)
    }
}

/// Wires the default substrates under `config.data_dir`:
///
/// - key-value collections in `kv_store.json`,
/// - exports and backups as files below the data directory,
/// - secrets in `secure_store.json`, when a master key is configured.
pub fn open(config: &StorageConfig) -> Result<DataStorageService> {
    let kv_persistence = Arc::new(Persistence::new(config.data_dir.join(KV_STORAGE_FILE))?);
    let kv = Arc::new(MemKvStore::open(kv_persistence)?);
    let files = Arc::new(LocalFileStore::new(&config.data_dir));

    let service = DataStorageService::new(kv, files);
    match &config.master_key {
        Some(key) => {
            let persistence = Arc::new(Persistence::new(config.data_dir.join(SECURE_STORE_FILE))?);
            Ok(service.with_secure_store(Arc::new(VaultStore::open(persistence, key)?)))
        }
        None => {
            log::warn!("{} is not set; the secure store is disabled", MASTER_KEY_ENV);
            Ok(service)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_master_key_is_redacted_in_debug() {
        let config = StorageConfig::new("d").with_master_key_hex(&"ab".repeat(32)).unwrap();
        let printed = format!("{:?}", config);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("abab"));
    }

    #[test]
    fn test_malformed_master_key() {
        assert!(StorageConfig::new("d").with_master_key_hex("1234").is_err());
    }

    #[tokio::test]
    async fn test_open_persists_collections_and_secrets() {
        let dir = tempdir().unwrap();
        let config = StorageConfig::new(dir.path()).with_master_key_hex(&"01".repeat(32)).unwrap();

        {
            let service = open(&config).unwrap();
            assert!(service.store_secure_data("token", "abc").await);
            assert!(service.set_cache(&serde_json::json!("warm")).await);
        }

        assert!(dir.path().join(KV_STORAGE_FILE).exists());
        assert!(dir.path().join(SECURE_STORE_FILE).exists());

        let service = open(&config).unwrap();
        assert_eq!(service.get_secure_data("token").await, Some("abc".to_string()));
        assert_eq!(service.get_cache().await, Some(serde_json::json!("warm")));
        assert!(service.get_storage_stats().await.storage_used > 0);
    }
}
