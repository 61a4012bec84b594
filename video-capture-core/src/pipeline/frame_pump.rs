use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::RwLock;

use crate::models::error::CaptureError;
use crate::models::frame::{CameraFrame, FrameInfo};
use crate::pipeline::encoder_slot::{ActiveSegment, EncoderSlot};
use crate::pipeline::frame_gate::{FrameGate, GatePermit, GateStats};
use crate::pipeline::render;
use crate::traits::frame_encoder::DrawableFrame;
use crate::traits::frame_source::FrameSource;

/// Application overlay drawn onto every recorded frame, in the session's
/// locked orientation.
pub type OverlayCallback = Arc<dyn Fn(&mut DrawableFrame<'_>) + Send + Sync + 'static>;

/// What a single pump tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was handed to the submission worker.
    Dispatched,
    /// The gate was busy (or the worker unavailable); the tick was dropped.
    Dropped,
    /// The camera had no frame; nothing counted.
    NoFrame,
    /// No encoder is active; nothing to feed.
    Idle,
}

/// Pump tuning taken from the session config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpOptions {
    pub frame_interval: Duration,
    pub diagnostics_enabled: bool,
    pub stall_warning_after: Duration,
}

impl Default for PumpOptions {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_secs_f64(1.0 / 30.0),
            diagnostics_enabled: false,
            stall_warning_after: Duration::from_secs(2),
        }
    }
}

enum FrameResult {
    Submitted,
    SubmitFailed,
    /// The encoder was swapped out between tick and render.
    Inactive,
}

struct FrameJob {
    permit: GatePermit,
    frame: CameraFrame,
    segment: ActiveSegment,
    timestamp: Duration,
}

/// State shared by the tick path, the timer thread and the submission worker.
struct PumpShared {
    source: Arc<dyn FrameSource>,
    slot: Arc<EncoderSlot>,
    gate: Arc<FrameGate>,
    overlay: RwLock<Option<OverlayCallback>>,
    diagnostics_enabled: AtomicBool,
    frame_interval: Duration,
    stall_warning_after: Duration,
    stall_reported: AtomicBool,
}

impl PumpShared {
    fn tick(&self, jobs: &Sender<FrameJob>) -> TickOutcome {
        let Some(segment) = self.slot.current() else {
            return TickOutcome::Idle;
        };

        let Some(permit) = self.gate.try_acquire() else {
            self.gate.record_dropped();
            self.report_stall();
            return TickOutcome::Dropped;
        };
        self.stall_reported.store(false, Ordering::Relaxed);

        // permit drops (and frees the gate) on the early return
        let Some(frame) = self.source.latest_frame() else {
            return TickOutcome::NoFrame;
        };

        let timestamp = segment.elapsed();
        let job = FrameJob {
            permit,
            frame,
            segment,
            timestamp,
        };
        match jobs.try_send(job) {
            Ok(()) => TickOutcome::Dispatched,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                log::error!("Frame submission worker unavailable, dropping frame");
                self.gate.record_dropped();
                TickOutcome::Dropped
            }
        }
    }

    fn report_stall(&self) {
        if let Some(busy) = self.gate.busy_for() {
            if busy > self.stall_warning_after && !self.stall_reported.swap(true, Ordering::Relaxed) {
                log::warn!(
                    "Frame submission has held the gate for {:?}; frames drop until it returns",
                    busy
                );
            }
        }
    }

    fn process(&self, job: FrameJob) {
        let FrameJob {
            permit,
            frame,
            segment,
            timestamp,
        } = job;
        let reached_submit = Cell::new(false);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.render_and_submit(&frame, &segment, timestamp, &reached_submit)
        }));

        match result {
            Ok(Ok(FrameResult::Submitted)) | Ok(Ok(FrameResult::SubmitFailed)) => {}
            Ok(Ok(FrameResult::Inactive)) => {
                log::debug!("Encoder swapped out mid-tick, skipping frame");
                self.gate.record_dropped();
            }
            Ok(Err(e)) => {
                log::warn!("Frame dropped: {}", e);
                self.gate.record_dropped();
            }
            Err(_) => {
                log::error!("Frame pipeline panicked at {:?}", timestamp);
                if !reached_submit.get() {
                    self.gate.record_dropped();
                }
            }
        }

        // an encoder detached while this frame held it is released here
        self.slot.dispose_parked();
        drop(permit);
    }

    fn render_and_submit(
        &self,
        frame: &CameraFrame,
        segment: &ActiveSegment,
        timestamp: Duration,
        reached_submit: &Cell<bool>,
    ) -> Result<FrameResult, CaptureError> {
        let mut encoder = segment.encoder.lock();
        if !self.slot.is_active(&segment.encoder) {
            return Ok(FrameResult::Inactive);
        }

        {
            let DrawableFrame { canvas, info } = encoder.begin_frame(timestamp)?;

            let (src, dst) = render::aspect_fill_rects(frame.width, frame.height, info.width, info.height);
            canvas.draw_frame(frame, src, dst);

            let overlay = self.overlay.read().clone();
            let diagnostics = self.diagnostics_enabled.load(Ordering::Relaxed);
            if overlay.is_some() || diagnostics {
                canvas.save();
                render::apply_rotation(canvas, info.width, info.height, segment.rotation);
                let (width, height) = segment.rotation.rotated_dimensions(info.width, info.height);

                if let Some(overlay) = overlay {
                    let mut rotated = DrawableFrame {
                        canvas: &mut *canvas,
                        info: FrameInfo {
                            width,
                            height,
                            timestamp: info.timestamp,
                        },
                    };
                    overlay(&mut rotated);
                }
                if diagnostics {
                    let stats = self.gate.stats();
                    render::draw_diagnostics(canvas, width, height, &stats, self.frame_interval);
                }

                canvas.restore();
            }
        }

        reached_submit.set(true);
        self.gate.record_submitted();
        let started = Instant::now();
        match encoder.submit_frame() {
            Ok(()) => {
                self.gate.record_latency(started.elapsed());
                Ok(FrameResult::Submitted)
            }
            Err(e) => {
                self.gate.record_failed_submission(started.elapsed());
                log::warn!("Encoder rejected frame at {:?}: {}", timestamp, e);
                Ok(FrameResult::SubmitFailed)
            }
        }
    }
}

fn run_worker(shared: Arc<PumpShared>, jobs: Receiver<FrameJob>) {
    for job in jobs.iter() {
        shared.process(job);
    }
    log::debug!("Frame submission worker exiting");
}

/// Delivers camera frames to the session's active encoder.
///
/// Driven either by `tick()` (frame-arrival callbacks) or by the built-in
/// timer (`start_timer`). A tick never blocks: frames are drawn and submitted
/// on a dedicated worker thread, and the `FrameGate` keeps at most one of them
/// in flight.
///
/// ```text
/// [tick] → gate CAS → latest_frame → [worker] begin_frame → draw → overlay → submit_frame
///            │busy                                                     │
///            └→ dropped++                               permit dropped ┘
/// ```
pub struct FramePump {
    shared: Arc<PumpShared>,
    jobs: Option<Sender<FrameJob>>,
    worker_handle: Option<thread::JoinHandle<()>>,
    timer_running: Arc<AtomicBool>,
    timer_handle: Option<thread::JoinHandle<()>>,
}

impl FramePump {
    pub fn new(
        source: Arc<dyn FrameSource>,
        slot: Arc<EncoderSlot>,
        gate: Arc<FrameGate>,
        options: PumpOptions,
    ) -> Result<Self, CaptureError> {
        let shared = Arc::new(PumpShared {
            source,
            slot,
            gate,
            overlay: RwLock::new(None),
            diagnostics_enabled: AtomicBool::new(options.diagnostics_enabled),
            frame_interval: options.frame_interval,
            stall_warning_after: options.stall_warning_after,
            stall_reported: AtomicBool::new(false),
        });

        let (tx, rx) = crossbeam_channel::bounded(1);
        let worker_shared = Arc::clone(&shared);
        let worker_handle = thread::Builder::new()
            .name("frame-submit".into())
            .spawn(move || run_worker(worker_shared, rx))
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn frame worker: {}", e)))?;

        Ok(Self {
            shared,
            jobs: Some(tx),
            worker_handle: Some(worker_handle),
            timer_running: Arc::new(AtomicBool::new(false)),
            timer_handle: None,
        })
    }

    /// Run one pump step. Safe to call from any thread, never blocks on the encoder.
    pub fn tick(&self) -> TickOutcome {
        match &self.jobs {
            Some(jobs) => self.shared.tick(jobs),
            None => TickOutcome::Idle,
        }
    }

    /// Tick every `frame_interval` on a background thread.
    pub fn start_timer(&mut self) -> Result<(), CaptureError> {
        if self.timer_running.load(Ordering::SeqCst) {
            return Ok(());
        }
        let Some(jobs) = self.jobs.clone() else {
            return Err(CaptureError::InvalidState("frame pump is shut down".into()));
        };

        self.timer_running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.timer_running);
        let shared = Arc::clone(&self.shared);
        let interval = shared.frame_interval;

        let handle = thread::Builder::new()
            .name("frame-pump".into())
            .spawn(move || {
                let mut next = Instant::now();
                while running.load(Ordering::SeqCst) {
                    shared.tick(&jobs);
                    next += interval;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        // fell behind, don't try to catch up with a burst
                        next = now;
                    }
                }
            })
            .map_err(|e| {
                self.timer_running.store(false, Ordering::SeqCst);
                CaptureError::Unknown(format!("failed to spawn pump timer: {}", e))
            })?;

        self.timer_handle = Some(handle);
        Ok(())
    }

    pub fn stop_timer(&mut self) {
        self.timer_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.timer_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn set_overlay(&self, overlay: Option<OverlayCallback>) {
        *self.shared.overlay.write() = overlay;
    }

    pub fn set_diagnostics_enabled(&self, enabled: bool) {
        self.shared.diagnostics_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn stats(&self) -> GateStats {
        self.shared.gate.stats()
    }

    /// Wait until no frame is in flight. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.shared.gate.wait_until_free(timeout)
    }

    /// Stop the timer and the worker. A worker stuck inside the encoder is
    /// detached instead of joined.
    pub fn shutdown(&mut self) {
        self.stop_timer();
        self.jobs = None;
        if let Some(handle) = self.worker_handle.take() {
            if self.shared.gate.wait_until_free(Duration::from_millis(100)) {
                let _ = handle.join();
            } else {
                log::warn!("Frame submission still in flight at shutdown, detaching worker");
            }
        }
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.shutdown();
    }
}
