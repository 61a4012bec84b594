use crate::models::frame::CameraFrame;

/// Source of live camera frames.
///
/// Implemented by platform camera backends and by `TestPatternSource`.
pub trait FrameSource: Send + Sync {
    /// The most recent frame, or `None` when no new frame is available.
    ///
    /// Ownership of the frame moves to the caller, which drops it after use.
    fn latest_frame(&self) -> Option<CameraFrame>;
}
