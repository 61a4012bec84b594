use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::captured_media::CapturedMedia;
use crate::models::config::PRE_ROLL_BUDGET_FPS;
use crate::models::error::CaptureError;
use crate::storage::files;

/// A finalized pre-roll segment waiting to be spliced in front of the live file.
#[derive(Debug, Clone, PartialEq)]
pub struct PreRollSegment {
    pub path: PathBuf,
    pub duration: Duration,
}

/// Temp-file target for footage encoded before the user commits.
///
/// Lifecycle: `arm` picks a fresh path (nothing is written), the pre-roll
/// encoder buffers against it, `promote` records the finalized file, and
/// `clear` deletes whatever exists on disk and resets everything.
#[derive(Debug, Default)]
pub struct PreRollBuffer {
    armed_path: Option<PathBuf>,
    window: Duration,
    max_frame_budget: u32,
    segment: Option<PreRollSegment>,
}

impl PreRollBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new unique temp path for a pre-roll window of `window`.
    ///
    /// A previously armed (or promoted) file is deleted first.
    pub fn arm(&mut self, temp_dir: &Path, extension: &str, window: Duration) -> Result<PathBuf, CaptureError> {
        self.clear();
        files::ensure_directory(temp_dir)?;

        let path = files::unique_file_path(temp_dir, "preroll", extension);
        self.window = window;
        self.max_frame_budget = frame_budget(window);
        self.armed_path = Some(path.clone());
        log::debug!(
            "Pre-roll armed at {} ({:?}, ~{} frames)",
            path.display(),
            window,
            self.max_frame_budget
        );
        Ok(path)
    }

    pub fn is_armed(&self) -> bool {
        self.armed_path.is_some()
    }

    pub fn armed_path(&self) -> Option<&Path> {
        self.armed_path.as_deref()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Change the window of an armed buffer without picking a new path.
    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
        if self.is_armed() {
            self.max_frame_budget = frame_budget(window);
        }
    }

    /// Advisory frame count for the window. Zero when not armed.
    pub fn max_frame_budget(&self) -> u32 {
        if self.is_armed() || self.segment.is_some() {
            self.max_frame_budget
        } else {
            0
        }
    }

    /// Record the pre-roll encoder's finalized output.
    ///
    /// Returns false (and tracks nothing) when the file is missing or empty;
    /// the session then continues as if no pre-roll existed.
    pub fn promote(&mut self, media: &CapturedMedia) -> bool {
        self.armed_path = None;

        if !files::is_usable_media_file(&media.file_path) {
            log::warn!(
                "Pre-roll segment {} is missing or empty, recording live only",
                media.file_path.display()
            );
            files::remove_if_exists(&media.file_path);
            self.segment = None;
            return false;
        }

        log::info!(
            "Pre-roll promoted: {} ({:?})",
            media.file_path.display(),
            media.duration
        );
        self.segment = Some(PreRollSegment {
            path: media.file_path.clone(),
            duration: media.duration,
        });
        true
    }

    pub fn segment(&self) -> Option<&PreRollSegment> {
        self.segment.as_ref()
    }

    /// Duration of the promoted segment, zero when there is none.
    pub fn tracked_duration(&self) -> Duration {
        self.segment.as_ref().map(|s| s.duration).unwrap_or(Duration::ZERO)
    }

    /// Delete the armed and promoted files if present and reset all state.
    pub fn clear(&mut self) {
        if let Some(path) = self.armed_path.take() {
            files::remove_if_exists(&path);
        }
        if let Some(segment) = self.segment.take() {
            files::remove_if_exists(&segment.path);
        }
        self.window = Duration::ZERO;
        self.max_frame_budget = 0;
    }
}

fn frame_budget(window: Duration) -> u32 {
    let frames = (window.as_secs_f64() * PRE_ROLL_BUDGET_FPS).ceil();
    (frames as u32).max(1)
}
