//! Gesture Store is the on-device persistence layer for hand-gesture recordings
//! and LeRobot training data.
//!
//! It reconciles three substrates with different characteristics: an unordered
//! string key-value store for JSON collections, a file system for exports and
//! backups, and an encrypted key-value store for credential-like secrets.
//!
//! ## Core Components
//! - [`engine`]: Concrete substrates (in-memory KV with persistence, local and
//!   in-memory file stores, the AES-256-GCM vault).
//! - [`service`]: The [`service::DataStorageService`] facade with its
//!   repositories, export, backup/restore, statistics and maintenance.
//! - [`model`]: The serde data model.
//! - [`config`]: Environment-driven wiring of the default substrates.

pub mod config;
pub mod engine;
pub mod model;
pub mod service;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the gesture store.
#[derive(Error, Debug)]
pub enum Error {
    /// The underlying store could not be read, or the stored value is malformed.
    #[error("read fault on {key}: {reason}")]
    ReadFault { key: String, reason: String },
    /// The underlying store rejected or failed a write.
    #[error("write fault on {key}: {reason}")]
    WriteFault { key: String, reason: String },
    /// A file-system operation failed (missing path, permission, disk full).
    #[error("file fault at {}: {source}", .path.display())]
    FileFault {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A backup carries a version this build does not understand.
    #[error("unrecognized backup version {0:?}")]
    ValidationFault(String),
    /// An export could not be produced.
    #[error("export to {path} failed: {source}")]
    Export {
        path: String,
        #[source]
        source: Box<Error>,
    },
    /// A backup could not be produced.
    #[error("backup to {path} failed: {source}")]
    Backup {
        path: String,
        #[source]
        source: Box<Error>,
    },
    /// A backup could not be restored.
    #[error("restore from {path} failed: {source}")]
    Restore {
        path: String,
        #[source]
        source: Box<Error>,
    },
    /// Encryption or decryption failed.
    #[error("crypto error: {0}")]
    Crypto(String),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
    /// Error during JSON serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized Result type for gesture store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Asynchronous, string-keyed, string-valued persistent map.
///
/// The sole substrate for JSON collections and the cache namespace.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// Stores `value` under `key`.
    async fn set(&self, key: &str, value: String) -> Result<()>;
    /// Stores every pair in one substrate write: either all land or none do.
    async fn multi_set(&self, pairs: Vec<(String, String)>) -> Result<()>;
    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
    /// Removes every key in one substrate write.
    async fn multi_remove(&self, keys: &[&str]) -> Result<()>;
    /// Lists all keys currently present.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Hierarchical file system used for exports and backups.
///
/// Paths are full paths, built by prefixing [`FileStore::document_dir`].
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Root prefix for every path handed out by this store. Ends with `/`.
    fn document_dir(&self) -> &str;
    /// Creates a directory and its parents. Existing directories are fine.
    async fn make_dir(&self, path: &str) -> Result<()>;
    /// Writes `contents` to `path`, replacing any previous file.
    async fn write_string(&self, path: &str, contents: &str) -> Result<()>;
    /// Reads the whole file at `path`.
    async fn read_string(&self, path: &str) -> Result<String>;
    /// Lists the file names directly inside the directory at `path`.
    async fn read_dir(&self, path: &str) -> Result<Vec<String>>;
    /// Deletes the file at `path`.
    async fn delete(&self, path: &str) -> Result<()>;
    /// Byte size of the file at `path`, or `None` if it does not exist.
    async fn size(&self, path: &str) -> Result<Option<u64>>;
}

/// Encrypted, string-keyed, string-valued persistent map for secrets.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Encrypts and stores `value` under `key`.
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;
    /// Retrieves and decrypts the value under `key`, or `None` if absent.
    async fn get_item(&self, key: &str) -> Result<Option<String>>;
    /// Deletes `key`. Deleting an absent key is not an error.
    async fn delete_item(&self, key: &str) -> Result<()>;
}
