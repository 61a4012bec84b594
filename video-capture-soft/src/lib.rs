//! # video-capture-soft
//!
//! Portable software backend for video-capture-core.
//!
//! Provides:
//! - `SoftwareEncoder` / `SoftwareEncoderFactory` — run-length `.vcap` encoder with pre-roll ring
//! - `ContainerMuxer` — joins a pre-roll and a live `.vcap` segment
//! - `SoftwareCanvas` — RGBA raster with a transform stack
//! - `TestPatternSource` — synthetic camera for demos and tests
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use video_capture_core::{CaptureManager, SessionConfig};
//! use video_capture_soft::{ContainerMuxer, SoftwareEncoderFactory, TestPatternSource};
//!
//! let manager = CaptureManager::new(Arc::new(SoftwareEncoderFactory), Arc::new(ContainerMuxer));
//! let session = manager.open_session(SessionConfig::default())?;
//! let mut pump = session.create_pump(Arc::new(TestPatternSource::new(1280, 720)))?;
//! pump.start_timer()?;
//! session.start_recording()?;
//! ```

pub mod canvas;
pub mod container;
pub mod encoder;
pub mod frame_ring;
pub mod muxer;
pub mod test_pattern;

pub use canvas::SoftwareCanvas;
pub use container::{Container, ContainerError, ContainerHeader, ContainerWriter};
pub use encoder::{SoftwareEncoder, SoftwareEncoderFactory};
pub use frame_ring::FrameRing;
pub use muxer::ContainerMuxer;
pub use test_pattern::TestPatternSource;

#[cfg(test)]
mod scenarios;
