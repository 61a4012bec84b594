use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const FREE: u8 = 0;
const BUSY: u8 = 1;

/// Single-slot admission control in front of the encoder.
///
/// At most one frame is between `begin_frame` and the end of `submit_frame`
/// at any instant. The slot is taken with a compare-and-swap and handed back
/// when the `GatePermit` drops, whatever happened in between.
#[derive(Debug)]
pub struct FrameGate {
    slot: AtomicU8,
    submitted: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    last_submit_us: AtomicU64,
    /// Microseconds since `epoch` at which the slot was last taken.
    acquired_at_us: AtomicU64,
    epoch: Instant,
}

/// Snapshot of the gate counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateStats {
    /// Frames handed to `FrameEncoder::submit_frame`.
    pub submitted: u64,
    /// Ticks that found the gate busy, plus frames abandoned before submission.
    pub dropped: u64,
    /// Submissions the encoder reported as failed.
    pub failed_submissions: u64,
    pub last_submit_latency: Duration,
}

impl GateStats {
    /// Share of admitted frames that reached the encoder, 0.0–1.0.
    pub fn submit_ratio(&self) -> f32 {
        let total = self.submitted + self.dropped;
        if total == 0 {
            return 1.0;
        }
        self.submitted as f32 / total as f32
    }
}

impl FrameGate {
    pub fn new() -> Self {
        Self {
            slot: AtomicU8::new(FREE),
            submitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            last_submit_us: AtomicU64::new(0),
            acquired_at_us: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    /// Take the slot if it is free. Never blocks.
    pub fn try_acquire(self: &Arc<Self>) -> Option<GatePermit> {
        self.slot
            .compare_exchange(FREE, BUSY, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.acquired_at_us
            .store(self.epoch.elapsed().as_micros() as u64, Ordering::Release);
        Some(GatePermit {
            gate: Arc::clone(self),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.slot.load(Ordering::Acquire) == BUSY
    }

    /// How long the current holder has had the slot, if it is taken.
    pub fn busy_for(&self) -> Option<Duration> {
        if !self.is_busy() {
            return None;
        }
        let since = Duration::from_micros(self.acquired_at_us.load(Ordering::Acquire));
        Some(self.epoch.elapsed().saturating_sub(since))
    }

    /// Poll until the slot is free or `timeout` elapses. Returns true if free.
    pub fn wait_until_free(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_busy() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_submission(&self, latency: Duration) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub fn record_latency(&self, latency: Duration) {
        self.last_submit_us
            .store(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed_submissions: self.failed.load(Ordering::Relaxed),
            last_submit_latency: Duration::from_micros(self.last_submit_us.load(Ordering::Relaxed)),
        }
    }

    /// Zero the counters at the start of a session. The slot is left alone.
    pub fn reset_counters(&self) {
        self.submitted.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.last_submit_us.store(0, Ordering::Relaxed);
    }

    fn release(&self) {
        self.slot.store(FREE, Ordering::Release);
    }
}

impl Default for FrameGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of holding the gate. Dropping it frees the slot.
#[derive(Debug)]
pub struct GatePermit {
    gate: Arc<FrameGate>,
}

impl GatePermit {
    pub fn gate(&self) -> &FrameGate {
        &self.gate
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}
