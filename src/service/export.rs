//! Gesture export to JSON or CSV under `exports/`.
//!
//! CSV flattens each gesture to one row:
//!
//! | column | content |
//! |---|---|
//! | `id`, `type`, `confidence`, `timestamp`, `startTime` | scalar fields |
//! | `endTime`, `duration` | empty when absent |
//! | `poseCount` | number of hand poses |
//! | `keypointCount` | keypoints summed over all poses |
//! | `handedness` | distinct tags in first-seen order, joined by `\|` |
//! | `meanPoseConfidence` | mean of per-pose confidence, empty with no poses |
//!
//! Keypoint coordinates are not written individually; `keypointCount` is how
//! they are accounted for.

use log::{info, warn};
use serde_json::json;

use crate::model::{ExportFormat, ExportOptions, ExportRecord, GestureRecord};
use crate::service::{now_millis, DataStorageService, BACKUP_VERSION, EXPORTS_DIR};
use crate::{Error, Result};

pub const CSV_HEADER: &str =
    "id,type,confidence,timestamp,startTime,endTime,duration,poseCount,keypointCount,handedness,meanPoseConfidence";

impl DataStorageService {
    /// Writes the gesture collection to `exports/<timestamp>.<json|csv>` and
    /// returns the file path.
    ///
    /// `include_metadata` only affects JSON output.
    pub async fn export_data(&self, options: ExportOptions) -> Result<String> {
        let stamp = self.next_stamp();
        let dir = self.document_path(EXPORTS_DIR);
        let path = format!("{}{}.{}", dir, stamp, options.format.extension());
        let wrap = |e: Error| Error::Export {
            path: path.clone(),
            source: Box::new(e),
        };

        let gestures = self.gestures.load().await.map_err(wrap)?;
        let contents = match options.format {
            ExportFormat::Json => {
                let body = if options.include_metadata {
                    let dataset = self.get_dataset_metadata().await;
                    json!({
                        "metadata": {
                            "exportedAt": stamp,
                            "format": "json",
                            "version": BACKUP_VERSION,
                            "totalGestures": gestures.len(),
                            "dataset": dataset,
                        },
                        "gestures": &gestures,
                    })
                } else {
                    serde_json::to_value(&gestures).map_err(|e| wrap(e.into()))?
                };
                serde_json::to_string_pretty(&body).map_err(|e| wrap(e.into()))?
            }
            ExportFormat::Csv => render_csv(&gestures),
        };

        self.files.make_dir(&dir).await.map_err(wrap)?;
        self.files.write_string(&path, &contents).await.map_err(wrap)?;

        info!("Exported {} gestures to {}", gestures.len(), path);
        self.record_export(options.format, &path, gestures.len()).await;
        Ok(path)
    }

    /// Writes every stored LeRobot data point as one JSON dataset under
    /// `exports/lerobot_dataset_<timestamp>.json`.
    pub async fn export_lerobot_dataset(&self) -> Result<String> {
        let stamp = self.next_stamp();
        let dir = self.document_path(EXPORTS_DIR);
        let path = format!("{}lerobot_dataset_{}.json", dir, stamp);
        let wrap = |e: Error| Error::Export {
            path: path.clone(),
            source: Box::new(e),
        };

        let points = self.data_points.load().await.map_err(wrap)?;
        let mut gesture_ids: Vec<&str> = Vec::new();
        for p in &points {
            if !gesture_ids.contains(&p.gesture_id.as_str()) {
                gesture_ids.push(&p.gesture_id);
            }
        }

        let body = json!({
            "info": {
                "createdAt": stamp,
                "version": BACKUP_VERSION,
                "totalDataPoints": points.len(),
                "gestureIds": gesture_ids,
            },
            "dataPoints": &points,
        });
        let contents = serde_json::to_string_pretty(&body).map_err(|e| wrap(e.into()))?;

        self.files.make_dir(&dir).await.map_err(wrap)?;
        self.files.write_string(&path, &contents).await.map_err(wrap)?;

        info!("Exported {} data points to {}", points.len(), path);
        self.record_export(ExportFormat::Json, &path, points.len()).await;
        Ok(path)
    }

    /// Logging history must not fail an export that already landed on disk.
    async fn record_export(&self, format: ExportFormat, path: &str, item_count: usize) {
        let record = ExportRecord {
            format,
            timestamp: now_millis(),
            file_path: path.to_string(),
            item_count,
        };
        if let Err(e) = self.export_history.append_all(vec![record]).await {
            warn!("Export to {} succeeded but history was not updated: {}", path, e);
        }
    }
}

/// Renders gestures as CSV with [`CSV_HEADER`] as the first line.
pub fn render_csv(gestures: &[GestureRecord]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + gestures.len() * 96);
    out.push_str(CSV_HEADER);
    out.push('\n');

    for g in gestures {
        let mut handedness: Vec<&str> = Vec::new();
        for pose in &g.poses {
            if !handedness.contains(&pose.handedness.as_str()) {
                handedness.push(&pose.handedness);
            }
        }
        let mean_pose_confidence = if g.poses.is_empty() {
            String::new()
        } else {
            let sum: f64 = g.poses.iter().map(|p| p.confidence).sum();
            format!("{:.4}", sum / g.poses.len() as f64)
        };

        let row = [
            escape_csv(&g.id),
            escape_csv(&g.gesture_type),
            g.confidence.to_string(),
            g.timestamp.to_string(),
            g.start_time.to_string(),
            g.end_time.map(|v| v.to_string()).unwrap_or_default(),
            g.duration.map(|v| v.to_string()).unwrap_or_default(),
            g.poses.len().to_string(),
            g.keypoint_count().to_string(),
            escape_csv(&handedness.join("|")),
            mean_pose_confidence,
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HandPose, Keypoint};

    fn pose(handedness: &str, confidence: f64, keypoints: usize) -> HandPose {
        HandPose {
            keypoints: (0..keypoints)
                .map(|i| Keypoint {
                    x: i as f64,
                    y: 0.0,
                    z: 0.0,
                    confidence: 1.0,
                    name: format!("kp{}", i),
                })
                .collect(),
            handedness: handedness.to_string(),
            confidence,
            timestamp: 0,
        }
    }

    #[test]
    fn test_csv_flattening_counts_keypoints() {
        let g = GestureRecord {
            id: "g1".to_string(),
            gesture_type: "grab".to_string(),
            confidence: 0.5,
            timestamp: 10,
            start_time: 10,
            poses: vec![pose("right", 0.8, 21), pose("left", 0.6, 21), pose("right", 1.0, 3)],
            end_time: None,
            duration: None,
        }
        .complete(40);

        let csv = render_csv(&[g]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "g1,grab,0.5,10,10,40,30,3,45,right|left,0.8000");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_csv_empty_optionals_and_quoting() {
        let g = GestureRecord {
            id: "g,2".to_string(),
            gesture_type: "say \"hi\"".to_string(),
            confidence: 1.0,
            timestamp: 1,
            start_time: 1,
            poses: vec![],
            end_time: None,
            duration: None,
        };

        let csv = render_csv(&[g]);
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(row, "\"g,2\",\"say \"\"hi\"\"\",1,1,1,,,0,0,,");
    }

    #[test]
    fn test_csv_header_only_for_empty_collection() {
        assert_eq!(render_csv(&[]), format!("{}\n", CSV_HEADER));
    }
}
