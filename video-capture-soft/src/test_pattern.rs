use std::sync::atomic::{AtomicU64, Ordering};

use video_capture_core::{CameraFrame, FrameSource};

/// Synthetic camera producing a diagonal gradient that shifts every frame.
///
/// With `unavailable_every(n)` every n-th request returns `None`, the way a
/// real camera occasionally has no new frame ready for a tick.
#[derive(Debug)]
pub struct TestPatternSource {
    width: u32,
    height: u32,
    unavailable_every: Option<u64>,
    requests: AtomicU64,
    produced: AtomicU64,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            unavailable_every: None,
            requests: AtomicU64::new(0),
            produced: AtomicU64::new(0),
        }
    }

    pub fn unavailable_every(mut self, n: u64) -> Self {
        self.unavailable_every = (n > 0).then_some(n);
        self
    }

    /// Frames handed out so far.
    pub fn frames_produced(&self) -> u64 {
        self.produced.load(Ordering::Relaxed)
    }

    /// Pattern for frame number `index`.
    pub fn render(&self, index: u64) -> CameraFrame {
        let shift = (index % 256) as u32;
        let mut pixels = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            for x in 0..self.width {
                let r = ((x * 255 / self.width.max(1)) + shift) % 256;
                let g = ((y * 255 / self.height.max(1)) + shift) % 256;
                let b = (index * 3 % 256) as u32;
                pixels.extend_from_slice(&[r as u8, g as u8, b as u8, 255]);
            }
        }
        CameraFrame::new(self.width, self.height, pixels)
    }
}

impl FrameSource for TestPatternSource {
    fn latest_frame(&self) -> Option<CameraFrame> {
        let request = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        if matches!(self.unavailable_every, Some(n) if request % n == 0) {
            return None;
        }
        let index = self.produced.fetch_add(1, Ordering::Relaxed);
        Some(self.render(index))
    }
}
