//! # video-capture-core
//!
//! Platform-agnostic video capture session engine.
//!
//! Drives the Idle → PreRoll → Live → Stopping state machine, feeds camera
//! frames to an encoder with at most one frame in flight, buffers pre-roll
//! footage in a temp file and splices it in front of the live segment.
//! Encoder backends implement `FrameEncoder` and are selected at runtime
//! through an `EncoderFactory`.
//!
//! ## Architecture
//!
//! ```text
//! video-capture-core (this crate)
//! ├── traits/       ← FrameEncoder, EncoderFactory, Canvas, FrameSource, Muxer, SessionDelegate
//! ├── models/       ← CaptureError, SessionState, SessionConfig, CapturedMedia, frames, diagnostics
//! ├── pipeline/     ← FrameGate, EncoderSlot, FramePump, render helpers
//! ├── session/      ← RecordingSession, PreRollBuffer, mux orchestration, registry, manager, restarts
//! └── storage/      ← unique paths, file checks, checksums, JSON sidecar
//! ```

pub mod models;
pub mod pipeline;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod testing;

// Re-export key types at crate root for convenience.
pub use models::captured_media::{CapturedMedia, MediaMetadata};
pub use models::config::SessionConfig;
pub use models::diagnostics::SessionDiagnostics;
pub use models::error::CaptureError;
pub use models::frame::{CameraFacing, CameraFrame, FrameInfo, Rect, Rgba, Rotation};
pub use models::state::{SegmentKind, SessionState, StartOutcome};
pub use pipeline::frame_gate::{FrameGate, GateStats};
pub use pipeline::frame_pump::{FramePump, OverlayCallback, PumpOptions, TickOutcome};
pub use session::manager::CaptureManager;
pub use session::recording::RecordingSession;
pub use session::restart::{RestartPhase, RestartScheduler, SettingChange};
pub use traits::canvas::Canvas;
pub use traits::frame_encoder::{
    DrawableFrame, EncoderFactory, EncoderParams, EncoderStats, EncoderStatus, FrameEncoder, ProgressCallback,
};
pub use traits::frame_source::FrameSource;
pub use traits::muxer::{MuxOutcome, MuxRequest, Muxer};
pub use traits::session_delegate::SessionDelegate;
