use std::time::Duration;

use serde::Serialize;

use super::frame::Rotation;
use super::state::SessionState;

/// Pipeline health snapshot for a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionDiagnostics {
    pub state: SessionState,
    /// Frames handed to the encoder this session.
    pub submitted_frames: u64,
    /// Frames dropped at the gate or abandoned before submission.
    pub dropped_frames: u64,
    /// Submissions the encoder rejected.
    pub failed_submissions: u64,
    pub last_submit_latency: Duration,
    /// Advisory pre-roll size in frames; zero when no pre-roll is armed.
    pub max_pre_roll_frames: u32,
    /// Orientation frozen for the current session, if one is running.
    pub locked_rotation: Option<Rotation>,
}

impl SessionDiagnostics {
    /// Ticks that found a camera frame (`submitted + dropped`).
    pub fn frames_offered(&self) -> u64 {
        self.submitted_frames + self.dropped_frames
    }
}
