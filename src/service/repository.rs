use std::marker::PhantomData;
use std::sync::Arc;
use log::{debug, error};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use crate::service::tolerant::tolerant;
use crate::{Error, KeyValueStore, Result};

/// Owns one logical collection: a JSON array stored under a single key.
///
/// Appends are whole-collection read-modify-write. Writers through the same
/// repository are serialized by an in-process lock, so concurrent appends
/// never observe a stale snapshot. Writers that bypass the repository (another
/// process, another repository instance over the same key) are not covered.
pub struct Repository<T> {
    store: Arc<dyn KeyValueStore>,
    key: &'static str,
    write_lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub fn new(store: Arc<dyn KeyValueStore>, key: &'static str) -> Self {
        Self {
            store,
            key,
            write_lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Holds off every other writer of this collection until dropped.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Reads the collection. An absent key is an empty collection.
    pub async fn load(&self) -> Result<Vec<T>> {
        match self.read_raw().await? {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| self.read_fault(e)),
        }
    }

    /// The persisted collection verbatim, or empty if absent or unreadable.
    pub async fn list(&self) -> Vec<T> {
        tolerant(self.key, self.load().await).value
    }

    /// Number of records, without decoding them.
    pub async fn count(&self) -> Result<usize> {
        match self.read_raw().await? {
            None => Ok(0),
            Some(raw) => serde_json::from_str::<Vec<IgnoredAny>>(&raw)
                .map(|v| v.len())
                .map_err(|e| self.read_fault(e)),
        }
    }

    /// Appends `records` with one read and one write. Returns the new length.
    ///
    /// An empty batch touches nothing. A batch that would not read back is
    /// refused before the collection is touched.
    pub async fn append_all(&self, records: Vec<T>) -> Result<usize> {
        if records.is_empty() {
            return self.count().await;
        }
        self.check_readable(&records)?;

        let _guard = self.lock().await;
        let mut current = self.load().await?;
        current.extend(records);

        let raw = self.encode(&current)?;
        self.store.set(self.key, raw).await.map_err(|e| match e {
            Error::WriteFault { .. } => e,
            other => Error::WriteFault {
                key: self.key.to_string(),
                reason: other.to_string(),
            },
        })?;
        Ok(current.len())
    }

    /// Appends one record. Faults are logged and reported as `false`.
    pub async fn store(&self, record: T) -> bool {
        self.store_batch(vec![record]).await
    }

    /// Appends a batch in a single write. Faults are logged and reported as
    /// `false`; in that case none of the batch is committed.
    pub async fn store_batch(&self, records: Vec<T>) -> bool {
        let n = records.len();
        match self.append_all(records).await {
            Ok(total) => {
                debug!("Stored {} record(s) in {} ({} total)", n, self.key, total);
                true
            }
            Err(e) => {
                error!("Failed to store {} record(s) in {}: {}", n, self.key, e);
                false
            }
        }
    }

    /// Serializes a full collection into the `(key, value)` pair that would
    /// replace this repository's contents.
    pub fn entry(&self, records: &[T]) -> Result<(String, String)> {
        Ok((self.key.to_string(), self.encode(records)?))
    }

    /// Fails with a write fault if `records` do not decode after encoding.
    ///
    /// JSON has no NaN or infinity: serde_json writes them as `null`, which
    /// then fails to decode as a number and would poison the whole collection.
    pub fn check_readable(&self, records: &[T]) -> Result<()> {
        let raw = self.encode(records)?;
        serde_json::from_str::<Vec<T>>(&raw)
            .map(|_| ())
            .map_err(|e| Error::WriteFault {
                key: self.key.to_string(),
                reason: format!("record would not read back: {}", e),
            })
    }

    fn encode(&self, records: &[T]) -> Result<String> {
        serde_json::to_string(records).map_err(|e| Error::WriteFault {
            key: self.key.to_string(),
            reason: e.to_string(),
        })
    }

    async fn read_raw(&self) -> Result<Option<String>> {
        self.store.get(self.key).await.map_err(|e| match e {
            Error::ReadFault { .. } => e,
            other => Error::ReadFault {
                key: self.key.to_string(),
                reason: other.to_string(),
            },
        })
    }

    fn read_fault(&self, e: serde_json::Error) -> Error {
        Error::ReadFault {
            key: self.key.to_string(),
            reason: e.to_string(),
        }
    }
}
