use std::time::Duration;

use crate::models::captured_media::CapturedMedia;
use crate::models::error::CaptureError;
use crate::models::state::SessionState;

/// Event delegate for recording session notifications.
///
/// Methods are called from whichever thread drove the transition (or from the
/// encoder for progress). Implementations should marshal to a UI thread if
/// needed and must not call back into the session synchronously.
pub trait SessionDelegate: Send + Sync {
    /// Called after every state change.
    fn on_state_changed(&self, state: SessionState);

    /// Called when committed (live) recording begins.
    fn on_recording_started(&self);

    /// Called with the live segment's encoded duration.
    fn on_recording_progress(&self, duration: Duration);

    /// Called once per successful session with the final artifact.
    fn on_recording_succeeded(&self, media: &CapturedMedia);

    /// Called when initialization, finalization or muxing fails.
    fn on_recording_failed(&self, error: &CaptureError);
}
