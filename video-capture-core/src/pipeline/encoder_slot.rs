use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::frame::Rotation;
use crate::models::state::SegmentKind;
use crate::traits::frame_encoder::FrameEncoder;

/// Encoder instance shared between the session (owner) and the pump worker
/// (borrower for the length of one frame).
pub type SharedEncoder = Arc<Mutex<Box<dyn FrameEncoder>>>;

/// The encoder currently receiving frames, plus what the pump needs to feed it.
#[derive(Clone)]
pub struct ActiveSegment {
    pub encoder: SharedEncoder,
    pub kind: SegmentKind,
    pub rotation: Rotation,
    pub width: u32,
    pub height: u32,
    started_at: Instant,
}

impl ActiveSegment {
    /// Media time since this segment's encoder was installed.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_same_encoder(&self, other: &SharedEncoder) -> bool {
        Arc::ptr_eq(&self.encoder, other)
    }
}

/// Holder of the session's active encoder.
///
/// The session installs and takes encoders; the pump only clones the current
/// segment per tick and treats an empty slot as "nothing to feed".
///
/// Encoders the session gave up on while a frame still held them are parked
/// here until the pump worker releases them and disposes them.
#[derive(Default)]
pub struct EncoderSlot {
    current: Mutex<Option<ActiveSegment>>,
    parked: Mutex<Vec<SharedEncoder>>,
}

impl EncoderSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `encoder` the active one. Its segment clock starts now.
    pub fn install(
        &self,
        encoder: SharedEncoder,
        kind: SegmentKind,
        rotation: Rotation,
        width: u32,
        height: u32,
    ) {
        let mut current = self.current.lock();
        if current.is_some() {
            log::warn!("Replacing an active encoder that was never taken");
        }
        *current = Some(ActiveSegment {
            encoder,
            kind,
            rotation,
            width,
            height,
            started_at: Instant::now(),
        });
    }

    /// Remove the active encoder so no further frames are dispatched to it.
    pub fn take(&self) -> Option<ActiveSegment> {
        self.current.lock().take()
    }

    pub fn current(&self) -> Option<ActiveSegment> {
        self.current.lock().clone()
    }

    /// Whether `encoder` is still the active one.
    pub fn is_active(&self, encoder: &SharedEncoder) -> bool {
        self.current
            .lock()
            .as_ref()
            .map(|s| s.is_same_encoder(encoder))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.current.lock().is_none()
    }

    /// Hand over an encoder that could not be disposed because it is busy.
    pub fn park(&self, encoder: SharedEncoder) {
        self.parked.lock().push(encoder);
    }

    /// Dispose every parked encoder that is no longer locked. Returns how
    /// many were released.
    pub fn dispose_parked(&self) -> usize {
        let mut parked = self.parked.lock();
        let before = parked.len();
        parked.retain(|encoder| match encoder.try_lock() {
            Some(mut encoder) => {
                encoder.dispose();
                false
            }
            None => true,
        });
        let released = before - parked.len();
        if released > 0 {
            log::debug!("Disposed {} detached encoder(s)", released);
        }
        released
    }

    pub fn parked_count(&self) -> usize {
        self.parked.lock().len()
    }
}
