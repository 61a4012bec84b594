use std::path::PathBuf;
use std::time::Duration;

use crate::models::error::CaptureError;

/// Inputs for joining a finalized pre-roll segment and a live segment.
#[derive(Debug, Clone, PartialEq)]
pub struct MuxRequest {
    pub pre_roll_path: PathBuf,
    pub live_path: PathBuf,
    pub output_path: PathBuf,
    /// Tracked duration of the pre-roll segment; live timestamps are offset by it.
    pub pre_roll_duration: Duration,
}

/// What the muxer knows about the file it wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MuxOutcome {
    /// Container duration of the muxed file, when the muxer can report it.
    pub duration: Option<Duration>,
    pub frame_count: Option<u64>,
}

/// Concatenates two already-encoded segments into one container without
/// re-encoding. Only invoked at session stop time.
pub trait Muxer: Send + Sync {
    fn mux(&self, request: &MuxRequest) -> Result<MuxOutcome, CaptureError>;
}
