use crate::model::StorageStats;
use crate::service::{keys, tolerant, DataStorageService, KV_STORAGE_FILE};

impl DataStorageService {
    /// Collection sizes plus the on-disk size of the key-value store.
    ///
    /// Never fails: every metric that cannot be read reports zero.
    pub async fn get_storage_stats(&self) -> StorageStats {
        let storage_path = self.document_path(KV_STORAGE_FILE);
        let (gestures, data_points, sessions, size) = futures::join!(
            self.gestures.count(),
            self.data_points.count(),
            self.sessions.count(),
            self.files.size(&storage_path)
        );

        StorageStats {
            total_gestures: tolerant(keys::GESTURES, gestures).value,
            total_data_points: tolerant(keys::DATA_POINTS, data_points).value,
            total_sessions: tolerant(keys::SESSIONS, sessions).value,
            storage_used: tolerant(&storage_path, size).value.unwrap_or(0),
        }
    }
}
