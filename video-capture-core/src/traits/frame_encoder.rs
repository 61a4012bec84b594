use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::models::captured_media::CapturedMedia;
use crate::models::error::CaptureError;
use crate::models::frame::{CameraFacing, FrameInfo, Rotation};
use crate::models::state::SegmentKind;
use crate::traits::canvas::Canvas;

/// Callback invoked with the encoded media duration as encoding progresses.
pub type ProgressCallback = Arc<dyn Fn(Duration) + Send + Sync + 'static>;

/// Parameters for `FrameEncoder::initialize`.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderParams {
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub record_audio: bool,
    /// Orientation locked for the whole session.
    pub rotation: Rotation,
    pub facing: CameraFacing,
    /// Window of footage a pre-roll encoder keeps. `None` for live segments.
    pub pre_roll_window: Option<Duration>,
}

/// Lifecycle phase reported by an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncoderStatus {
    #[default]
    Idle,
    Initialized,
    /// Initialized but not started: frames are kept encoder-side only.
    Buffering,
    /// Started: frames are committed to the output file.
    Encoding,
    Stopped,
    Disposed,
}

/// Running counters exposed by an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_encoded: u64,
    pub status: EncoderStatus,
}

/// A drawing surface for one pending frame.
///
/// Borrowed from the encoder between `begin_frame` and `submit_frame`; the
/// borrow ending is the scope of the frame.
pub struct DrawableFrame<'a> {
    pub canvas: &'a mut dyn Canvas,
    pub info: FrameInfo,
}

/// Hardware or software video encoder consumed by the capture session.
///
/// Calls on one instance are strictly sequential:
/// `initialize → [start] → (begin_frame → submit_frame)* → stop | dispose`.
/// The `begin_frame`/`submit_frame` alternation is enforced by the frame gate
/// above this contract, not by implementations.
///
/// Implementations:
/// - `SoftwareEncoder` (video-capture-soft)
/// - Platform hardware encoders, selected through an `EncoderFactory`
pub trait FrameEncoder: Send {
    /// Configure output path, geometry and rate. No file bytes are implied.
    fn initialize(&mut self, params: &EncoderParams) -> Result<(), CaptureError>;

    /// Commit to writing the output file. Pre-roll encoders are never started.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Open a drawing surface for a frame at `timestamp` (segment-relative).
    fn begin_frame(&mut self, timestamp: Duration) -> Result<DrawableFrame<'_>, CaptureError>;

    /// Encode the frame drawn since the last `begin_frame`. May block while
    /// hardware consumes it.
    fn submit_frame(&mut self) -> Result<(), CaptureError>;

    /// Finalize the output and describe it.
    fn stop(&mut self) -> Result<CapturedMedia, CaptureError>;

    /// Release all resources without finalizing. Must not fail.
    fn dispose(&mut self);

    fn is_recording(&self) -> bool;

    fn set_progress_callback(&mut self, callback: ProgressCallback);

    fn stats(&self) -> EncoderStats {
        EncoderStats::default()
    }
}

/// Builds encoder instances for a target platform.
///
/// Chosen once when the capture manager is constructed.
pub trait EncoderFactory: Send + Sync {
    fn create(&self, kind: SegmentKind) -> Result<Box<dyn FrameEncoder>, CaptureError>;

    /// Container extension (without dot) of the files this backend writes.
    fn file_extension(&self) -> &str;
}
