use log::{info, warn};
use serde_json::Value;

use crate::model::BackupSnapshot;
use crate::service::{keys, tolerant, DataStorageService, BACKUPS_DIR, BACKUP_VERSION};
use crate::{Error, Result};

const BACKUP_PREFIX: &str = "backup_";

impl DataStorageService {
    /// Snapshots every collection into `backups/backup_<timestamp>.json`.
    ///
    /// A collection that cannot be read is backed up as empty rather than
    /// blocking the whole backup.
    pub async fn create_backup(&self) -> Result<String> {
        let stamp = self.next_stamp();
        let dir = self.document_path(BACKUPS_DIR);
        let path = format!("{}{}{}.json", dir, BACKUP_PREFIX, stamp);
        let wrap = |e: Error| Error::Backup {
            path: path.clone(),
            source: Box::new(e),
        };

        let (gestures, sessions, data_points, metadata) = futures::join!(
            self.gestures.load(),
            self.sessions.load(),
            self.data_points.load(),
            self.load_metadata()
        );

        let gestures = tolerant(keys::GESTURES, gestures);
        let sessions = tolerant(keys::SESSIONS, sessions);
        let data_points = tolerant(keys::DATA_POINTS, data_points);
        let metadata = tolerant(keys::METADATA, metadata);
        let degraded: Vec<&str> = [
            (keys::GESTURES, gestures.degraded),
            (keys::SESSIONS, sessions.degraded),
            (keys::DATA_POINTS, data_points.degraded),
            (keys::METADATA, metadata.degraded),
        ]
        .into_iter()
        .filter_map(|(key, degraded)| degraded.then_some(key))
        .collect();
        if !degraded.is_empty() {
            warn!("Backup {} is missing unreadable collections: {}", path, degraded.join(", "));
        }

        let mut snapshot = BackupSnapshot {
            version: BACKUP_VERSION.to_string(),
            timestamp: stamp,
            gestures: gestures.value,
            sessions: sessions.value,
            data_points: data_points.value,
            metadata: metadata.value,
        };
        reconcile_counter(&mut snapshot);
        let contents = serde_json::to_string(&snapshot).map_err(|e| wrap(e.into()))?;

        self.files.make_dir(&dir).await.map_err(wrap)?;
        self.files.write_string(&path, &contents).await.map_err(wrap)?;

        info!(
            "Backup written to {} ({} gestures, {} sessions, {} data points)",
            path,
            snapshot.gestures.len(),
            snapshot.sessions.len(),
            snapshot.data_points.len()
        );
        Ok(path)
    }

    /// Replaces gestures, sessions, data points and metadata with the contents
    /// of the backup at `path`.
    ///
    /// The file is fully read and validated before anything is written, and
    /// all four collections are replaced in a single store write.
    pub async fn restore_backup(&self, path: &str) -> Result<BackupSnapshot> {
        let wrap = |e: Error| Error::Restore {
            path: path.to_string(),
            source: Box::new(e),
        };

        let raw = self.files.read_string(path).await.map_err(wrap)?;
        let mut snapshot = parse_backup(path, &raw).map_err(wrap)?;
        reconcile_counter(&mut snapshot);

        let entries = vec![
            self.gestures.entry(&snapshot.gestures).map_err(wrap)?,
            self.sessions.entry(&snapshot.sessions).map_err(wrap)?,
            self.data_points.entry(&snapshot.data_points).map_err(wrap)?,
            (
                keys::METADATA.to_string(),
                serde_json::to_string(&snapshot.metadata).map_err(|e| wrap(e.into()))?,
            ),
        ];

        {
            let _gestures = self.gestures.lock().await;
            let _sessions = self.sessions.lock().await;
            let _points = self.data_points.lock().await;
            let _metadata = self.metadata_lock.lock().await;
            self.kv.multi_set(entries).await.map_err(wrap)?;
        }

        info!(
            "Restored backup {} taken at {} ({} gestures, {} sessions, {} data points)",
            path,
            snapshot.timestamp,
            snapshot.gestures.len(),
            snapshot.sessions.len(),
            snapshot.data_points.len()
        );
        Ok(snapshot)
    }

    /// Backup file paths, newest first. A missing backups directory is empty.
    pub async fn list_backups(&self) -> Vec<String> {
        let dir = self.document_path(BACKUPS_DIR);
        let names = match self.files.read_dir(&dir).await {
            Ok(names) => names,
            Err(e) => {
                warn!("Could not list {}: {}", dir, e);
                return Vec::new();
            }
        };

        let mut stamped: Vec<(u64, String)> = names
            .into_iter()
            .filter_map(|name| {
                let stamp = name
                    .strip_prefix(BACKUP_PREFIX)?
                    .trim_end_matches(".json")
                    .parse::<u64>()
                    .ok()?;
                Some((stamp, format!("{}{}", dir, name)))
            })
            .collect();
        stamped.sort_by(|a, b| b.0.cmp(&a.0));
        stamped.into_iter().map(|(_, path)| path).collect()
    }
}

/// The dataset counter never reports fewer points than the snapshot holds.
fn reconcile_counter(snapshot: &mut BackupSnapshot) {
    let held = snapshot.data_points.len() as u64;
    if snapshot.metadata.total_data_points < held {
        warn!(
            "Dataset counter {} is behind the {} data points in the snapshot; raising it",
            snapshot.metadata.total_data_points, held
        );
        snapshot.metadata.total_data_points = held;
    }
}

/// Checks the version marker before decoding the body, so a backup from an
/// unknown schema is reported as such rather than as a decode error.
fn parse_backup(path: &str, raw: &str) -> Result<BackupSnapshot> {
    let value: Value = serde_json::from_str(raw).map_err(|e| Error::ReadFault {
        key: path.to_string(),
        reason: e.to_string(),
    })?;

    match value.get("version").and_then(Value::as_str) {
        Some(BACKUP_VERSION) => {}
        Some(other) => return Err(Error::ValidationFault(other.to_string())),
        None => return Err(Error::ValidationFault("<missing>".to_string())),
    }

    serde_json::from_value(value).map_err(|e| Error::ReadFault {
        key: path.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backup_rejects_unknown_version() {
        let raw = r#"{"version":"2.0.0","timestamp":1,"gestures":[],"sessions":[],"dataPoints":[],"metadata":{}}"#;
        assert!(matches!(parse_backup("b", raw), Err(Error::ValidationFault(v)) if v == "2.0.0"));
    }

    #[test]
    fn test_parse_backup_rejects_missing_version() {
        assert!(matches!(parse_backup("b", "{}"), Err(Error::ValidationFault(_))));
    }

    #[test]
    fn test_parse_backup_rejects_garbage() {
        assert!(matches!(parse_backup("b", "not json"), Err(Error::ReadFault { .. })));
    }

    #[test]
    fn test_counter_is_raised_to_held_points() {
        let point = r#"{"gestureId":"g","observation":{"timestamp":1,"handPoses":[],"cameraFrame":{"width":1,"height":1,"format":"rgb","data":"00"}},"action":{"type":"grab","parameters":{},"timestamp":1,"confidence":1.0},"reward":0.0,"done":false,"metadata":{"sessionId":"s","deviceType":"d","recordingQuality":"high","environment":"lab"}}"#;
        let raw = format!(
            r#"{{"version":"1.0.0","timestamp":7,"gestures":[],"sessions":[],"dataPoints":[{p},{p}],"metadata":{{"totalDataPoints":0,"lastUpdated":0}}}}"#,
            p = point
        );
        let mut snapshot = parse_backup("b", &raw).unwrap();
        reconcile_counter(&mut snapshot);
        assert_eq!(snapshot.metadata.total_data_points, 2);

        snapshot.metadata.total_data_points = 9;
        reconcile_counter(&mut snapshot);
        assert_eq!(snapshot.metadata.total_data_points, 9);
    }

    #[test]
    fn test_parse_backup_accepts_empty_snapshot() {
        let raw = r#"{"version":"1.0.0","timestamp":7,"gestures":[],"sessions":[],"dataPoints":[],"metadata":{}}"#;
        let snapshot = parse_backup("b", raw).unwrap();
        assert_eq!(snapshot.timestamp, 7);
        assert!(snapshot.gestures.is_empty());
    }
}
