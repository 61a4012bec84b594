use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::frame::{CameraFacing, Rotation};

/// A finalized media file, produced by an encoder's `stop()` or by the muxer.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedMedia {
    pub file_path: PathBuf,
    pub duration: Duration,
    pub file_size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub facing: CameraFacing,
    /// Number of video frames in the file, when the producer knows it.
    pub frame_count: u64,
    /// Hex SHA-256 of the file contents, when the producer computed one.
    pub checksum: Option<String>,
}

impl CapturedMedia {
    /// Human-readable file size ("12.3 MB").
    pub fn file_size_string(&self) -> String {
        let bytes = self.file_size_bytes as f64;
        if self.file_size_bytes < 1024 {
            format!("{} B", self.file_size_bytes)
        } else if self.file_size_bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes / 1024.0)
        } else if self.file_size_bytes < 1024 * 1024 * 1024 {
            format!("{:.1} MB", bytes / (1024.0 * 1024.0))
        } else {
            format!("{:.1} GB", bytes / (1024.0 * 1024.0 * 1024.0))
        }
    }

    /// Duration as `mm:ss`.
    pub fn duration_string(&self) -> String {
        let secs = self.duration.as_secs();
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

/// Metadata stored alongside a finished recording.
///
/// Serializable for the JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub id: String,
    pub file_path: String,
    pub duration_secs: f64,
    pub file_size_bytes: u64,
    pub created_at: String,
    pub facing: CameraFacing,
    pub checksum: Option<String>,
    pub frame_count: u64,
    pub pre_roll_secs: f64,
    pub rotation_degrees: i32,
}

impl MediaMetadata {
    pub fn from_media(media: &CapturedMedia, pre_roll: Duration, rotation: Rotation) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_path: media.file_path.to_string_lossy().to_string(),
            duration_secs: media.duration.as_secs_f64(),
            file_size_bytes: media.file_size_bytes,
            created_at: media.created_at.to_rfc3339(),
            facing: media.facing,
            checksum: media.checksum.clone(),
            frame_count: media.frame_count,
            pre_roll_secs: pre_roll.as_secs_f64(),
            rotation_degrees: rotation.degrees(),
        }
    }
}
