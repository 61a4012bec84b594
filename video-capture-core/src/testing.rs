//! Scripted collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Condvar, Mutex};

use crate::models::captured_media::CapturedMedia;
use crate::models::error::CaptureError;
use crate::models::frame::{CameraFacing, CameraFrame, FrameInfo, Rect, Rgba};
use crate::models::state::{SegmentKind, SessionState};
use crate::traits::canvas::Canvas;
use crate::traits::frame_encoder::{
    DrawableFrame, EncoderFactory, EncoderParams, FrameEncoder, ProgressCallback,
};
use crate::traits::frame_source::FrameSource;
use crate::traits::muxer::{MuxOutcome, MuxRequest, Muxer};
use crate::traits::session_delegate::SessionDelegate;

// --- Canvas ---

#[derive(Debug, Clone, PartialEq)]
pub enum CanvasOp {
    Save,
    Restore,
    Translate(f32, f32),
    Rotate(f32),
    DrawFrame { src: Rect, dst: Rect },
    Fill(Rect, Rgba),
}

pub struct RecordingCanvas {
    pub width: u32,
    pub height: u32,
    pub ops: Vec<CanvasOp>,
}

impl RecordingCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
        }
    }
}

impl Canvas for RecordingCanvas {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn save(&mut self) {
        self.ops.push(CanvasOp::Save);
    }

    fn restore(&mut self) {
        self.ops.push(CanvasOp::Restore);
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.ops.push(CanvasOp::Translate(dx, dy));
    }

    fn rotate_degrees(&mut self, degrees: f32) {
        self.ops.push(CanvasOp::Rotate(degrees));
    }

    fn draw_frame(&mut self, _frame: &CameraFrame, src: Rect, dst: Rect) {
        self.ops.push(CanvasOp::DrawFrame { src, dst });
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        self.ops.push(CanvasOp::Fill(rect, color));
    }
}

// --- Latch used to hold an encoder call open ---

#[derive(Default)]
pub struct Latch {
    open: Mutex<bool>,
    cond: Condvar,
    entered: AtomicBool,
}

impl Latch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn wait(&self) {
        self.entered.store(true, Ordering::SeqCst);
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }

    pub fn release(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }

    pub fn has_waiter(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }
}

// --- Encoder ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderOp {
    Initialize,
    Start,
    BeginFrame(Duration),
    SubmitFrame,
    Stop,
    Dispose,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncoderCall {
    pub encoder_id: usize,
    pub kind: SegmentKind,
    pub op: EncoderOp,
    pub params: Option<EncoderParams>,
}

/// Calls from every encoder a factory built, in order.
#[derive(Default)]
pub struct EncoderLog {
    pub calls: Mutex<Vec<EncoderCall>>,
    pub frames: Mutex<Vec<Vec<CanvasOp>>>,
    in_frame: AtomicBool,
    pub overlap_violations: AtomicUsize,
}

impl EncoderLog {
    pub fn ops(&self) -> Vec<(usize, SegmentKind, EncoderOp)> {
        self.calls
            .lock()
            .iter()
            .map(|c| (c.encoder_id, c.kind, c.op))
            .collect()
    }

    pub fn position(&self, kind: SegmentKind, op: EncoderOp) -> Option<usize> {
        self.calls
            .lock()
            .iter()
            .position(|c| c.kind == kind && c.op == op)
    }

    pub fn count(&self, op: EncoderOp) -> usize {
        self.calls.lock().iter().filter(|c| c.op == op).count()
    }

    pub fn params_for(&self, kind: SegmentKind) -> Option<EncoderParams> {
        self.calls
            .lock()
            .iter()
            .find(|c| c.kind == kind && c.op == EncoderOp::Initialize)
            .and_then(|c| c.params.clone())
    }

    pub fn begin_timestamps(&self) -> Vec<Duration> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c.op {
                EncoderOp::BeginFrame(ts) => Some(ts),
                _ => None,
            })
            .collect()
    }
}

/// How a scripted encoder behaves.
#[derive(Clone, Default)]
pub struct EncoderScript {
    pub fail_initialize: bool,
    pub fail_start: bool,
    pub fail_begin: bool,
    pub fail_submit: bool,
    pub fail_stop: bool,
    /// `submit_frame` blocks on this latch.
    pub hold_submit: Option<Arc<Latch>>,
    /// `stop` blocks on this latch.
    pub hold_stop: Option<Arc<Latch>>,
    /// Bytes written to the output path on `stop` (0 writes an empty file,
    /// `None` writes nothing).
    pub output_bytes: Option<usize>,
    pub reported_duration: Duration,
    /// Reported through the progress callback on every submitted frame.
    pub report_progress: bool,
}

impl EncoderScript {
    pub fn writing(bytes: usize, duration: Duration) -> Self {
        Self {
            output_bytes: Some(bytes),
            reported_duration: duration,
            ..Default::default()
        }
    }
}

pub struct ScriptedEncoder {
    id: usize,
    kind: SegmentKind,
    script: EncoderScript,
    log: Arc<EncoderLog>,
    params: Option<EncoderParams>,
    canvas: RecordingCanvas,
    started: bool,
    progress: Option<ProgressCallback>,
    frames: u64,
}

impl ScriptedEncoder {
    fn record(&self, op: EncoderOp) {
        self.log.calls.lock().push(EncoderCall {
            encoder_id: self.id,
            kind: self.kind,
            op,
            params: None,
        });
    }
}

impl FrameEncoder for ScriptedEncoder {
    fn initialize(&mut self, params: &EncoderParams) -> Result<(), CaptureError> {
        self.log.calls.lock().push(EncoderCall {
            encoder_id: self.id,
            kind: self.kind,
            op: EncoderOp::Initialize,
            params: Some(params.clone()),
        });
        if self.script.fail_initialize {
            return Err(CaptureError::InitializationFailed("scripted".into()));
        }
        self.canvas = RecordingCanvas::new(params.width, params.height);
        self.params = Some(params.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.record(EncoderOp::Start);
        if self.script.fail_start {
            return Err(CaptureError::InitializationFailed("scripted start".into()));
        }
        self.started = true;
        Ok(())
    }

    fn begin_frame(&mut self, timestamp: Duration) -> Result<DrawableFrame<'_>, CaptureError> {
        self.record(EncoderOp::BeginFrame(timestamp));
        if self.log.in_frame.swap(true, Ordering::SeqCst) {
            self.log.overlap_violations.fetch_add(1, Ordering::SeqCst);
        }
        if self.script.fail_begin {
            self.log.in_frame.store(false, Ordering::SeqCst);
            return Err(CaptureError::EncodingFailed("scripted begin".into()));
        }
        self.canvas.ops.clear();
        let info = FrameInfo {
            width: self.canvas.width,
            height: self.canvas.height,
            timestamp,
        };
        Ok(DrawableFrame {
            canvas: &mut self.canvas,
            info,
        })
    }

    fn submit_frame(&mut self) -> Result<(), CaptureError> {
        self.record(EncoderOp::SubmitFrame);
        if let Some(latch) = &self.script.hold_submit {
            latch.wait();
        }
        self.log.frames.lock().push(std::mem::take(&mut self.canvas.ops));
        self.log.in_frame.store(false, Ordering::SeqCst);
        if self.script.fail_submit {
            return Err(CaptureError::EncodingFailed("scripted submit".into()));
        }
        self.frames += 1;
        if self.script.report_progress {
            if let Some(progress) = &self.progress {
                progress(Duration::from_millis(self.frames * 33));
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<CapturedMedia, CaptureError> {
        self.record(EncoderOp::Stop);
        if let Some(latch) = &self.script.hold_stop {
            latch.wait();
        }
        if self.script.fail_stop {
            return Err(CaptureError::FinalizationFailed("scripted stop".into()));
        }
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| CaptureError::InvalidState("not initialized".into()))?;
        let path = params.output_path.clone();
        if let Some(bytes) = self.script.output_bytes {
            fs::write(&path, vec![7u8; bytes]).map_err(|e| CaptureError::storage("scripted write", e))?;
        }
        Ok(CapturedMedia {
            file_path: path.clone(),
            duration: self.script.reported_duration,
            file_size_bytes: fs::metadata(&path).map(|m| m.len()).unwrap_or(0),
            created_at: Utc::now(),
            facing: params.facing,
            frame_count: self.frames,
            checksum: None,
        })
    }

    fn dispose(&mut self) {
        self.record(EncoderOp::Dispose);
        self.started = false;
    }

    fn is_recording(&self) -> bool {
        self.started
    }

    fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }
}

/// Hands out scripted encoders in order; falls back to `default_script`.
pub struct ScriptedFactory {
    pub log: Arc<EncoderLog>,
    scripts: Mutex<VecDeque<EncoderScript>>,
    default_script: EncoderScript,
    created: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new(scripts: Vec<EncoderScript>) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(EncoderLog::default()),
            scripts: Mutex::new(scripts.into()),
            default_script: EncoderScript::writing(64, Duration::from_secs(1)),
            created: AtomicUsize::new(0),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl EncoderFactory for ScriptedFactory {
    fn create(&self, kind: SegmentKind) -> Result<Box<dyn FrameEncoder>, CaptureError> {
        let id = self.created.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_script.clone());
        Ok(Box::new(ScriptedEncoder {
            id,
            kind,
            script,
            log: Arc::clone(&self.log),
            params: None,
            canvas: RecordingCanvas::new(0, 0),
            started: false,
            progress: None,
            frames: 0,
        }))
    }

    fn file_extension(&self) -> &str {
        "vcap"
    }
}

// --- Frame source ---

/// Returns a frame on every call unless switched off.
pub struct StaticSource {
    pub available: AtomicBool,
    pub calls: AtomicUsize,
    width: u32,
    height: u32,
}

impl StaticSource {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            width,
            height,
        })
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl FrameSource for StaticSource {
    fn latest_frame(&self) -> Option<CameraFrame> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return None;
        }
        Some(CameraFrame::solid(self.width, self.height, Rgba::WHITE))
    }
}

// --- Muxer ---

pub struct ScriptedMuxer {
    pub requests: Mutex<Vec<MuxRequest>>,
    pub fail: bool,
    /// Write this many bytes to the output before failing.
    pub partial_bytes: usize,
    pub report_duration: Option<Duration>,
}

impl ScriptedMuxer {
    pub fn ok(report_duration: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: false,
            partial_bytes: 0,
            report_duration,
        })
    }

    pub fn failing(partial_bytes: usize) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: true,
            partial_bytes,
            report_duration: None,
        })
    }
}

impl Muxer for ScriptedMuxer {
    fn mux(&self, request: &MuxRequest) -> Result<MuxOutcome, CaptureError> {
        self.requests.lock().push(request.clone());
        if self.fail {
            if self.partial_bytes > 0 {
                fs::write(&request.output_path, vec![1u8; self.partial_bytes])
                    .map_err(|e| CaptureError::storage("partial write", e))?;
            }
            return Err(CaptureError::MuxFailed("scripted".into()));
        }
        let pre = fs::read(&request.pre_roll_path).map_err(|e| CaptureError::storage("read", e))?;
        let live = fs::read(&request.live_path).map_err(|e| CaptureError::storage("read", e))?;
        let mut out = pre;
        out.extend_from_slice(&live);
        fs::write(&request.output_path, out).map_err(|e| CaptureError::storage("write", e))?;
        Ok(MuxOutcome {
            duration: self.report_duration,
            frame_count: None,
        })
    }
}

// --- Delegate ---

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    State(SessionState),
    Started,
    Progress(Duration),
    Succeeded(CapturedMedia),
    Failed(CaptureError),
}

#[derive(Default)]
pub struct RecordingDelegate {
    pub events: Mutex<Vec<SessionEvent>>,
}

impl RecordingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    pub fn succeeded(&self) -> Vec<CapturedMedia> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Succeeded(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<CaptureError> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Failed(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::State(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

impl SessionDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: SessionState) {
        self.events.lock().push(SessionEvent::State(state));
    }

    fn on_recording_started(&self) {
        self.events.lock().push(SessionEvent::Started);
    }

    fn on_recording_progress(&self, duration: Duration) {
        self.events.lock().push(SessionEvent::Progress(duration));
    }

    fn on_recording_succeeded(&self, media: &CapturedMedia) {
        self.events.lock().push(SessionEvent::Succeeded(media.clone()));
    }

    fn on_recording_failed(&self, error: &CaptureError) {
        self.events.lock().push(SessionEvent::Failed(error.clone()));
    }
}

// --- Helpers ---

pub fn test_params(path: PathBuf) -> EncoderParams {
    EncoderParams {
        output_path: path,
        width: 64,
        height: 48,
        frame_rate: 30,
        record_audio: false,
        rotation: Default::default(),
        facing: CameraFacing::Back,
        pre_roll_window: None,
    }
}

/// Poll `cond` every millisecond until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while !cond() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    true
}
