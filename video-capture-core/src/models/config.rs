use std::path::PathBuf;
use std::time::Duration;

use super::frame::CameraFacing;

/// Longest pre-roll window a session accepts.
pub const MAX_PRE_ROLL_DURATION: Duration = Duration::from_secs(30);

/// Frame rate assumed when sizing the pre-roll frame budget.
pub const PRE_ROLL_BUDGET_FPS: f64 = 30.0;

/// Configuration for a recording session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Encoded frame width in pixels (default: 1280).
    pub width: u32,

    /// Encoded frame height in pixels (default: 720).
    pub height: u32,

    /// Target frame rate (default: 30).
    pub frame_rate: u32,

    /// Ask the encoder to multiplex an audio stream (default: false).
    pub record_audio: bool,

    /// Camera the frames come from, recorded into the output media.
    pub facing: CameraFacing,

    /// Buffer frames into a disposable segment before recording is committed.
    pub pre_roll_enabled: bool,

    /// How much footage before the commit to keep (default: 5 s).
    pub pre_roll_duration: Duration,

    /// Directory where live segments and final artifacts are written.
    pub output_directory: PathBuf,

    /// Cache directory for pre-roll segments.
    pub temp_directory: PathBuf,

    /// Draw the diagnostics panel onto recorded frames.
    pub diagnostics_enabled: bool,

    /// Write `<media>.metadata.json` next to every successful artifact.
    pub write_metadata_sidecar: bool,

    /// Warn when a single frame submission holds the gate longer than this.
    pub stall_warning_after: Duration,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "frame size must be non-zero: {}x{}",
                self.width, self.height
            ));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(format!(
                "frame size must be even: {}x{}",
                self.width, self.height
            ));
        }
        if !(1..=240).contains(&self.frame_rate) {
            return Err(format!("unsupported frame rate: {}", self.frame_rate));
        }
        if self.pre_roll_enabled
            && (self.pre_roll_duration.is_zero() || self.pre_roll_duration > MAX_PRE_ROLL_DURATION)
        {
            return Err(format!(
                "pre-roll duration must be within (0, {}s]: {:?}",
                MAX_PRE_ROLL_DURATION.as_secs(),
                self.pre_roll_duration
            ));
        }
        Ok(())
    }

    /// Advisory number of frames a pre-roll window holds. Never enforced here;
    /// trimming happens inside the encoder.
    pub fn pre_roll_frame_budget(&self) -> u32 {
        let frames = (self.pre_roll_duration.as_secs_f64() * PRE_ROLL_BUDGET_FPS).ceil();
        (frames as u32).max(1)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 30,
            record_audio: false,
            facing: CameraFacing::Back,
            pre_roll_enabled: false,
            pre_roll_duration: Duration::from_secs(5),
            output_directory: PathBuf::from("."),
            temp_directory: std::env::temp_dir(),
            diagnostics_enabled: false,
            write_metadata_sidecar: false,
            stall_warning_after: Duration::from_secs(2),
        }
    }
}
