use std::collections::VecDeque;
use std::time::Duration;

use crate::container::EncodedFrame;

/// Time-windowed ring of encoded frames for pre-roll buffering.
///
/// Keeps frames whose timestamp lies within `window` of the newest one, and
/// at most `max_frames` of them.
///
/// Overflow behavior: drops oldest frames.
#[derive(Debug)]
pub struct FrameRing {
    frames: VecDeque<EncodedFrame>,
    window: Duration,
    max_frames: usize,
    bytes: usize,
}

impl FrameRing {
    pub fn new(window: Duration, max_frames: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            window,
            max_frames: max_frames.max(1),
            bytes: 0,
        }
    }

    /// Append a frame and trim everything that fell out of the window.
    ///
    /// Frames must arrive in non-decreasing timestamp order.
    pub fn push(&mut self, frame: EncodedFrame) {
        let newest = frame.timestamp;
        self.bytes += frame.payload.len();
        self.frames.push_back(frame);

        while let Some(front) = self.frames.front() {
            let expired = front.timestamp + self.window <= newest;
            if !expired && self.frames.len() <= self.max_frames {
                break;
            }
            self.pop_front();
        }
    }

    fn pop_front(&mut self) {
        if let Some(dropped) = self.frames.pop_front() {
            self.bytes -= dropped.payload.len();
        }
    }

    /// Remove and return all buffered frames, oldest first.
    pub fn drain(&mut self) -> Vec<EncodedFrame> {
        self.bytes = 0;
        self.frames.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Encoded bytes currently held.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Newest minus oldest timestamp.
    pub fn span(&self) -> Duration {
        match (self.frames.front(), self.frames.back()) {
            (Some(first), Some(last)) => last.timestamp.saturating_sub(first.timestamp),
            _ => Duration::ZERO,
        }
    }

    pub fn reset(&mut self) {
        self.frames.clear();
        self.bytes = 0;
    }
}
