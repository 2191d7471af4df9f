//! Records persisted by the store.
//!
//! Every type serializes to camelCase JSON. The persistence layer treats all of
//! them as opaque payloads: it never validates semantic fields, re-orders, or
//! deduplicates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One landmark of a hand pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub confidence: f64,
    pub name: String,
}

/// A single hand-pose snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandPose {
    pub keypoints: Vec<Keypoint>,
    pub handedness: String,
    pub confidence: f64,
    pub timestamp: u64,
}

/// One captured hand-gesture demonstration with its pose trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub gesture_type: String,
    pub confidence: f64,
    pub timestamp: u64,
    pub start_time: u64,
    pub poses: Vec<HandPose>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl GestureRecord {
    /// Marks the gesture finished at `end_time` and derives its duration.
    pub fn complete(mut self, end_time: u64) -> Self {
        self.end_time = Some(end_time);
        self.duration = Some(end_time.saturating_sub(self.start_time));
        self
    }

    pub fn keypoint_count(&self) -> usize {
        self.poses.iter().map(|p| p.keypoints.len()).sum()
    }
}

/// Camera frame attached to an observation. Raw bytes travel as hex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub format: String,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub timestamp: u64,
    pub hand_poses: Vec<HandPose>,
    pub camera_frame: CameraFrame,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub timestamp: u64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPointMetadata {
    pub session_id: String,
    pub device_type: String,
    pub recording_quality: String,
    pub environment: String,
}

/// One (observation, action, reward, done, metadata) tuple for robot learning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeRobotDataPoint {
    pub observation: Observation,
    pub action: Action,
    pub reward: f64,
    pub done: bool,
    pub metadata: DataPointMetadata,
}

/// A data point as persisted: the point plus the gesture it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDataPoint {
    pub gesture_id: String,
    #[serde(flatten)]
    pub point: LeRobotDataPoint,
}

/// Training session. Only `id` is interpreted; everything else is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSession {
    pub id: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Dataset-level bookkeeping kept under `dataset_metadata`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    #[serde(default)]
    pub total_data_points: u64,
    #[serde(default)]
    pub last_updated: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub include_metadata: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Json,
            include_metadata: true,
        }
    }
}

/// One entry of the export history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub format: ExportFormat,
    pub timestamp: u64,
    pub file_path: String,
    pub item_count: usize,
}

/// Versioned full-state snapshot written by a backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub version: String,
    pub timestamp: u64,
    pub gestures: Vec<GestureRecord>,
    pub sessions: Vec<TrainingSession>,
    pub data_points: Vec<StoredDataPoint>,
    pub metadata: DatasetMetadata,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_gestures: usize,
    pub total_data_points: usize,
    pub total_sessions: usize,
    pub storage_used: u64,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
