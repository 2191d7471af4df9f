//! The data storage service.
//!
//! [`DataStorageService`] is the single entry point the application state layer
//! calls into. Record stores never raise: they report a boolean. Export, backup
//! and restore surface errors carrying the offending path. Statistics never
//! fail and degrade each metric to zero.

pub mod backup;
pub mod export;
pub mod maintenance;
pub mod repository;
pub mod stats;
pub mod tolerant;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use log::{debug, error, warn};
use tokio::sync::Mutex;

use crate::model::{
    DatasetMetadata, ExportRecord, GestureRecord, LeRobotDataPoint, StoredDataPoint, TrainingSession,
};
use crate::{Error, FileStore, KeyValueStore, Result, SecureStore};

pub use repository::Repository;
pub use tolerant::{tolerant, Tolerant};

/// Key-value namespace.
pub mod keys {
    pub const GESTURES: &str = "stored_gestures";
    pub const SESSIONS: &str = "training_sessions";
    pub const DATA_POINTS: &str = "lerobot_data_points";
    pub const METADATA: &str = "dataset_metadata";
    pub const EXPORT_HISTORY: &str = "export_history";
    pub const CACHE: &str = "data_cache";

    /// Every collection removed by a bulk clear.
    pub const COLLECTIONS: [&str; 5] = [GESTURES, SESSIONS, DATA_POINTS, METADATA, EXPORT_HISTORY];
}

/// Directory for exports, relative to the document dir.
pub const EXPORTS_DIR: &str = "exports/";
/// Directory for backups, relative to the document dir.
pub const BACKUPS_DIR: &str = "backups/";
/// File holding the persisted key-value store, relative to the document dir.
pub const KV_STORAGE_FILE: &str = "kv_store.json";
/// Schema version written into, and required from, backup files.
pub const BACKUP_VERSION: &str = "1.0.0";

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Local persistence for gestures, LeRobot data points and sessions.
pub struct DataStorageService {
    pub(crate) kv: Arc<dyn KeyValueStore>,
    pub(crate) files: Arc<dyn FileStore>,
    pub(crate) secure: Option<Arc<dyn SecureStore>>,
    pub(crate) gestures: Repository<GestureRecord>,
    pub(crate) sessions: Repository<TrainingSession>,
    pub(crate) data_points: Repository<StoredDataPoint>,
    pub(crate) export_history: Repository<ExportRecord>,
    pub(crate) metadata_lock: Mutex<()>,
    last_stamp: AtomicU64,
}

impl DataStorageService {
    pub fn new(kv: Arc<dyn KeyValueStore>, files: Arc<dyn FileStore>) -> Self {
        Self {
            gestures: Repository::new(kv.clone(), keys::GESTURES),
            sessions: Repository::new(kv.clone(), keys::SESSIONS),
            data_points: Repository::new(kv.clone(), keys::DATA_POINTS),
            export_history: Repository::new(kv.clone(), keys::EXPORT_HISTORY),
            metadata_lock: Mutex::new(()),
            kv,
            files,
            secure: None,
            last_stamp: AtomicU64::new(0),
        }
    }

    pub fn with_secure_store(mut self, secure: Arc<dyn SecureStore>) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn gestures(&self) -> &Repository<GestureRecord> {
        &self.gestures
    }

    pub fn sessions(&self) -> &Repository<TrainingSession> {
        &self.sessions
    }

    pub fn data_points(&self) -> &Repository<StoredDataPoint> {
        &self.data_points
    }

    /// Millisecond timestamp for file names, strictly increasing per service
    /// so two exports in the same millisecond never share a path.
    pub(crate) fn next_stamp(&self) -> u64 {
        let now = now_millis();
        let mut prev = self.last_stamp.load(Ordering::SeqCst);
        loop {
            let next = now.max(prev + 1);
            match self.last_stamp.compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    pub(crate) fn document_path(&self, relative: &str) -> String {
        format!("{}{}", self.files.document_dir(), relative)
    }

    // --- Records ---

    pub async fn store_gesture(&self, gesture: GestureRecord) -> bool {
        self.gestures.store(gesture).await
    }

    pub async fn store_gestures_batch(&self, gestures: Vec<GestureRecord>) -> bool {
        self.gestures.store_batch(gestures).await
    }

    pub async fn store_lerobot_data_point(&self, point: LeRobotDataPoint, gesture_id: &str) -> bool {
        self.store_lerobot_data_points_batch(vec![point], gesture_id).await
    }

    /// Stores every point tagged with `gesture_id`. The collection and the
    /// dataset counter land together in one store write.
    pub async fn store_lerobot_data_points_batch(&self, points: Vec<LeRobotDataPoint>, gesture_id: &str) -> bool {
        if points.is_empty() {
            return true;
        }
        let added = points.len();
        let tagged = points
            .into_iter()
            .map(|point| StoredDataPoint {
                gesture_id: gesture_id.to_string(),
                point,
            })
            .collect();

        match self.append_data_points(tagged).await {
            Ok(total) => {
                debug!("Stored {} data point(s) for {} ({} total)", added, gesture_id, total);
                true
            }
            Err(e) => {
                error!("Failed to store {} data point(s) for {}: {}", added, gesture_id, e);
                false
            }
        }
    }

    async fn append_data_points(&self, tagged: Vec<StoredDataPoint>) -> Result<usize> {
        self.data_points.check_readable(&tagged)?;

        let _points = self.data_points.lock().await;
        let _metadata = self.metadata_lock.lock().await;

        let mut all = self.data_points.load().await?;
        let previous = all.len();
        let added = tagged.len();
        all.extend(tagged);

        // A corrupt counter is rebuilt from the collection rather than blocking capture.
        let mut metadata = match self.load_metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Rebuilding {}: {}", keys::METADATA, e);
                DatasetMetadata {
                    total_data_points: previous as u64,
                    ..DatasetMetadata::default()
                }
            }
        };
        metadata.total_data_points += added as u64;
        metadata.last_updated = now_millis();

        let entries = vec![
            self.data_points.entry(&all)?,
            (keys::METADATA.to_string(), serde_json::to_string(&metadata)?),
        ];
        self.kv.multi_set(entries).await.map_err(|e| match e {
            Error::WriteFault { .. } => e,
            other => Error::WriteFault {
                key: keys::DATA_POINTS.to_string(),
                reason: other.to_string(),
            },
        })?;
        Ok(all.len())
    }

    pub async fn store_session(&self, session: TrainingSession) -> bool {
        self.sessions.store(session).await
    }

    pub async fn store_sessions_batch(&self, sessions: Vec<TrainingSession>) -> bool {
        self.sessions.store_batch(sessions).await
    }

    pub async fn get_gestures(&self) -> Vec<GestureRecord> {
        self.gestures.list().await
    }

    pub async fn get_data_points(&self) -> Vec<StoredDataPoint> {
        self.data_points.list().await
    }

    pub async fn get_sessions(&self) -> Vec<TrainingSession> {
        self.sessions.list().await
    }

    pub async fn get_export_history(&self) -> Vec<ExportRecord> {
        self.export_history.list().await
    }

    pub async fn get_dataset_metadata(&self) -> DatasetMetadata {
        tolerant(keys::METADATA, self.load_metadata().await).value
    }

    pub(crate) async fn load_metadata(&self) -> Result<DatasetMetadata> {
        let raw = self.kv.get(keys::METADATA).await.map_err(|e| Error::ReadFault {
            key: keys::METADATA.to_string(),
            reason: e.to_string(),
        })?;
        match raw {
            None => Ok(DatasetMetadata::default()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| Error::ReadFault {
                key: keys::METADATA.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    // --- Secure store ---

    /// Stores a secret in the encrypted store. Never touches the data
    /// collections or the file system.
    pub async fn store_secure_data(&self, key: &str, value: &str) -> bool {
        let Some(secure) = &self.secure else {
            error!("Secure store is not configured; dropping write of {}", key);
            return false;
        };
        match secure.set_item(key, value).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to store secure data for {}: {}", key, e);
                false
            }
        }
    }

    pub async fn get_secure_data(&self, key: &str) -> Option<String> {
        let secure = self.secure.as_ref()?;
        match secure.get_item(key).await {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to read secure data for {}: {}", key, e);
                None
            }
        }
    }

    pub async fn delete_secure_data(&self, key: &str) -> bool {
        let Some(secure) = &self.secure else {
            return false;
        };
        match secure.delete_item(key).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to delete secure data for {}: {}", key, e);
                false
            }
        }
    }
}
