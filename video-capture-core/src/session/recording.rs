use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::captured_media::{CapturedMedia, MediaMetadata};
use crate::models::config::{SessionConfig, MAX_PRE_ROLL_DURATION};
use crate::models::diagnostics::SessionDiagnostics;
use crate::models::error::CaptureError;
use crate::models::frame::Rotation;
use crate::models::state::{SegmentKind, SessionState, StartOutcome};
use crate::pipeline::encoder_slot::{EncoderSlot, SharedEncoder};
use crate::pipeline::frame_gate::FrameGate;
use crate::pipeline::frame_pump::{FramePump, PumpOptions};
use crate::session::mux::mux_segments;
use crate::session::preroll::PreRollBuffer;
use crate::session::restart::{RestartScheduler, SettingChange};
use crate::storage::{files, metadata};
use crate::traits::frame_encoder::{EncoderFactory, EncoderParams, ProgressCallback};
use crate::traits::frame_source::FrameSource;
use crate::traits::muxer::Muxer;
use crate::traits::session_delegate::SessionDelegate;

/// How long `abort` waits for an in-flight frame before detaching the encoder.
const ABORT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

type DelegateCell = Arc<RwLock<Option<Arc<dyn SessionDelegate>>>>;

/// Mutable session state, protected by `parking_lot::Mutex`.
///
/// Never held across encoder or muxer calls.
struct SessionInner {
    state: SessionState,
    locked_rotation: Option<Rotation>,
    pre_roll: PreRollBuffer,
    live_output_path: Option<PathBuf>,
}

/// Capture session state machine.
///
/// Owns the active encoder (through the `EncoderSlot` the pump reads) and the
/// pre-roll buffer. Every mutating operation runs under a single transition
/// flag; a second caller is turned away instead of queued.
///
/// ```text
/// [FramePump] → [FrameGate] → [EncoderSlot] ← install/take ← RecordingSession
///                                                               │
///                                  PreRollBuffer ── promote ────┤
///                                                               └→ mux_segments → CapturedMedia
/// ```
pub struct RecordingSession {
    id: Uuid,
    config: Mutex<SessionConfig>,
    factory: Arc<dyn EncoderFactory>,
    muxer: Arc<dyn Muxer>,
    delegate: DelegateCell,
    inner: Mutex<SessionInner>,
    slot: Arc<EncoderSlot>,
    gate: Arc<FrameGate>,
    transitioning: AtomicBool,
    abort_requested: AtomicBool,
    device_rotation: AtomicI32,
    restart: Mutex<Option<RestartScheduler>>,
}

/// Held for the length of one transition. Runs a deferred abort on release.
struct TransitionGuard<'a> {
    session: &'a RecordingSession,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.session.transitioning.store(false, Ordering::SeqCst);
        if self.session.abort_requested.swap(false, Ordering::SeqCst) {
            log::info!("Running abort requested during transition");
            self.session.abort();
        }
    }
}

impl RecordingSession {
    pub fn new(config: SessionConfig, factory: Arc<dyn EncoderFactory>, muxer: Arc<dyn Muxer>) -> Self {
        Self {
            id: Uuid::new_v4(),
            config: Mutex::new(config),
            factory,
            muxer,
            delegate: Arc::new(RwLock::new(None)),
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                locked_rotation: None,
                pre_roll: PreRollBuffer::new(),
                live_output_path: None,
            }),
            slot: Arc::new(EncoderSlot::new()),
            gate: Arc::new(FrameGate::new()),
            transitioning: AtomicBool::new(false),
            abort_requested: AtomicBool::new(false),
            device_rotation: AtomicI32::new(0),
            restart: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn config(&self) -> SessionConfig {
        self.config.lock().clone()
    }

    /// Replace the configuration. Only allowed while idle.
    pub fn set_config(&self, config: SessionConfig) -> Result<(), CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        let _guard = self.begin_transition().ok_or_else(busy)?;
        if !self.state().is_idle() {
            return Err(CaptureError::InvalidState(
                "configuration can only change while idle".into(),
            ));
        }

        let pre_roll_changed = {
            let mut current = self.config.lock();
            let changed = current.pre_roll_enabled != config.pre_roll_enabled
                || current.pre_roll_duration != config.pre_roll_duration
                || current.temp_directory != config.temp_directory;
            *current = config.clone();
            changed
        };

        if pre_roll_changed {
            let mut inner = self.inner.lock();
            inner.pre_roll.clear();
            if config.pre_roll_enabled {
                inner.pre_roll.arm(
                    &config.temp_directory,
                    self.factory.file_extension(),
                    config.pre_roll_duration,
                )?;
            }
        }
        Ok(())
    }

    pub fn set_delegate(&self, delegate: Arc<dyn SessionDelegate>) {
        *self.delegate.write() = Some(delegate);
    }

    /// Route encoder-affecting setting changes made during pre-roll through
    /// `scheduler`.
    pub fn attach_restart_scheduler(&self, scheduler: RestartScheduler) {
        *self.restart.lock() = Some(scheduler);
    }

    /// Orientation frozen for the running session, `None` while idle.
    pub fn locked_rotation(&self) -> Option<Rotation> {
        self.inner.lock().locked_rotation
    }

    /// Current device orientation in degrees. Read only when a session locks
    /// its rotation; never affects a running session.
    pub fn set_device_rotation(&self, degrees: i32) {
        self.device_rotation.store(degrees, Ordering::Relaxed);
    }

    pub fn device_rotation(&self) -> Rotation {
        Rotation::from_degrees(self.device_rotation.load(Ordering::Relaxed))
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        let stats = self.gate.stats();
        let inner = self.inner.lock();
        SessionDiagnostics {
            state: inner.state,
            submitted_frames: stats.submitted,
            dropped_frames: stats.dropped,
            failed_submissions: stats.failed_submissions,
            last_submit_latency: stats.last_submit_latency,
            max_pre_roll_frames: inner.pre_roll.max_frame_budget(),
            locked_rotation: inner.locked_rotation,
        }
    }

    /// Whether an encoder is installed for the pump to feed.
    pub fn has_active_encoder(&self) -> bool {
        !self.slot.is_empty()
    }

    /// Path the pre-roll encoder is (or will be) writing to, if armed.
    pub fn pre_roll_path(&self) -> Option<PathBuf> {
        self.inner.lock().pre_roll.armed_path().map(|p| p.to_path_buf())
    }

    /// Build a frame pump feeding this session's active encoder from `source`.
    pub fn create_pump(&self, source: Arc<dyn FrameSource>) -> Result<FramePump, CaptureError> {
        let config = self.config();
        FramePump::new(
            source,
            Arc::clone(&self.slot),
            Arc::clone(&self.gate),
            PumpOptions {
                frame_interval: config.frame_interval(),
                diagnostics_enabled: config.diagnostics_enabled,
                stall_warning_after: config.stall_warning_after,
            },
        )
    }

    // --- Transitions ---

    /// Start or commit recording.
    ///
    /// Idle → PreRoll when pre-roll is enabled, Idle → Live otherwise, and
    /// PreRoll → Live (promotion) on a second call. Ignored while live or while
    /// another transition runs.
    pub fn start_recording(&self) -> Result<StartOutcome, CaptureError> {
        let Some(_guard) = self.begin_transition() else {
            log::debug!("start_recording ignored: transition in progress");
            return Ok(StartOutcome::Ignored);
        };

        let result = match self.state() {
            SessionState::Idle => self.start_from_idle(),
            SessionState::PreRoll => self.promote_to_live(),
            SessionState::Live | SessionState::Stopping => return Ok(StartOutcome::Ignored),
        };

        result.map_err(|e| {
            log::error!("Failed to start recording: {}", e);
            self.roll_back();
            self.notify_failed(&e);
            e
        })
    }

    /// Finalize the session.
    ///
    /// From Live: the live segment is finalized, muxed behind the pre-roll
    /// segment when one was promoted, and returned. From PreRoll (never
    /// committed): the buffer is finalized and discarded, `Ok(None)`.
    pub fn stop(&self) -> Result<Option<CapturedMedia>, CaptureError> {
        let _guard = self.begin_transition().ok_or_else(busy)?;

        match self.state() {
            SessionState::Idle | SessionState::Stopping => Ok(None),
            SessionState::PreRoll => {
                self.discard_pre_roll();
                Ok(None)
            }
            SessionState::Live => self.finish_live().map(Some),
        }
    }

    /// Cancel the session: the active encoder is disposed without finalizing,
    /// temp files are deleted, nothing is reported. Never fails.
    ///
    /// While another transition runs the abort is recorded and executed as
    /// soon as that transition finishes.
    pub fn abort(&self) {
        match self.begin_transition() {
            Some(_guard) => self.abort_now(),
            None => {
                log::info!("Abort deferred until the running transition completes");
                self.defer_abort();
            }
        }
    }

    /// Abort and release the restart scheduler. The session stays usable.
    pub fn dispose(&self) {
        self.abort();
        let scheduler = self.restart.lock().take();
        drop(scheduler);
    }

    /// Enable or disable pre-roll. A change aborts any running session first.
    pub fn set_pre_roll_enabled(&self, enabled: bool) -> Result<(), CaptureError> {
        if self.config.lock().pre_roll_enabled == enabled {
            return Ok(());
        }
        let _guard = self.begin_transition().ok_or_else(busy)?;

        self.abort_now();
        let config = {
            let mut config = self.config.lock();
            config.pre_roll_enabled = enabled;
            config.clone()
        };

        let mut inner = self.inner.lock();
        if enabled {
            inner.pre_roll.arm(
                &config.temp_directory,
                self.factory.file_extension(),
                config.pre_roll_duration,
            )?;
        } else {
            inner.pre_roll.clear();
        }
        log::info!("Pre-roll {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub fn set_pre_roll_duration(&self, duration: Duration) -> Result<(), CaptureError> {
        if duration.is_zero() || duration > MAX_PRE_ROLL_DURATION {
            return Err(CaptureError::ConfigurationFailed(format!(
                "pre-roll duration must be within (0, {}s]: {:?}",
                MAX_PRE_ROLL_DURATION.as_secs(),
                duration
            )));
        }
        self.reconfigure(SettingChange::PreRollDuration(duration))
    }

    /// Apply a setting change. Idle sessions take it immediately, a running
    /// pre-roll is rebuilt through the restart scheduler, and a live session
    /// keeps its encoder until the next session.
    pub fn reconfigure(&self, change: SettingChange) -> Result<(), CaptureError> {
        let mut next = self.config();
        match change {
            SettingChange::PreRollDuration(d) => next.pre_roll_duration = d,
            SettingChange::Resolution { width, height } => {
                next.width = width;
                next.height = height;
            }
            SettingChange::FrameRate(fps) => next.frame_rate = fps,
            SettingChange::Facing(facing) => next.facing = facing,
        }
        next.validate().map_err(CaptureError::ConfigurationFailed)?;
        *self.config.lock() = next;

        match self.state() {
            SessionState::Idle => {
                if let SettingChange::PreRollDuration(d) = change {
                    self.inner.lock().pre_roll.set_window(d);
                }
            }
            SessionState::PreRoll => match self.restart.lock().as_ref() {
                Some(scheduler) => scheduler.request(change),
                None => log::info!("{:?} applies from the next session", change),
            },
            SessionState::Live | SessionState::Stopping => {
                log::info!("{:?} applies from the next session", change)
            }
        }
        Ok(())
    }

    /// Rebuild a running pre-roll with the current configuration, keeping the
    /// locked rotation. No-op in any other state.
    pub fn restart_pre_roll(&self) -> Result<(), CaptureError> {
        let _guard = self.begin_transition().ok_or_else(busy)?;
        if self.state() != SessionState::PreRoll {
            return Ok(());
        }

        let config = self.config();
        let rotation = self.locked_rotation().unwrap_or_else(|| self.device_rotation());
        if let Some(segment) = self.slot.take() {
            self.discard_encoder(segment.encoder, ABORT_LOCK_TIMEOUT);
        }
        self.inner.lock().pre_roll.clear();

        log::info!("Restarting pre-roll ({:?} window)", config.pre_roll_duration);
        self.open_pre_roll(&config, rotation).map_err(|e| {
            log::error!("Failed to restart pre-roll: {}", e);
            self.roll_back();
            self.notify_failed(&e);
            e
        })
    }

    // --- Internal helpers ---

    fn begin_transition(&self) -> Option<TransitionGuard<'_>> {
        self.transitioning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(TransitionGuard { session: self })
    }

    /// Leave the abort for the running transition's guard to pick up. If that
    /// guard was already released before the flag landed, run it here.
    fn defer_abort(&self) {
        self.abort_requested.store(true, Ordering::SeqCst);
        if let Some(_guard) = self.begin_transition() {
            if self.abort_requested.swap(false, Ordering::SeqCst) {
                self.abort_now();
            }
        }
    }

    fn start_from_idle(&self) -> Result<StartOutcome, CaptureError> {
        let config = self.config();
        config.validate().map_err(CaptureError::ConfigurationFailed)?;

        let rotation = self.device_rotation();
        self.gate.reset_counters();
        self.inner.lock().locked_rotation = Some(rotation);

        if config.pre_roll_enabled {
            self.open_pre_roll(&config, rotation)?;
            self.set_state(SessionState::PreRoll);
            log::info!("Pre-roll started (rotation {}°)", rotation.degrees());
            Ok(StartOutcome::PreRollStarted)
        } else {
            self.open_live(&config, rotation)?;
            self.set_state(SessionState::Live);
            self.notify_started();
            log::info!("Live recording started (rotation {}°)", rotation.degrees());
            Ok(StartOutcome::LiveStarted)
        }
    }

    /// PreRoll → Live. The pre-roll encoder is finalized and released before
    /// the live encoder is created.
    fn promote_to_live(&self) -> Result<StartOutcome, CaptureError> {
        let config = self.config();
        let rotation = self.locked_rotation().unwrap_or_else(|| self.device_rotation());

        let segment = self.slot.take().ok_or(CaptureError::NoActiveEncoder)?;
        match finish_encoder(&segment.encoder) {
            Ok(media) => {
                self.inner.lock().pre_roll.promote(&media);
            }
            Err(e) => {
                log::warn!("Pre-roll finalization failed, recording live only: {}", e);
                self.inner.lock().pre_roll.clear();
            }
        }

        self.open_live(&config, rotation)?;
        self.set_state(SessionState::Live);
        self.notify_started();
        log::info!("Pre-roll committed, live recording started");
        Ok(StartOutcome::Promoted)
    }

    fn open_pre_roll(&self, config: &SessionConfig, rotation: Rotation) -> Result<(), CaptureError> {
        let path = {
            let mut inner = self.inner.lock();
            match inner.pre_roll.armed_path().map(|p| p.to_path_buf()) {
                Some(path) => {
                    inner.pre_roll.set_window(config.pre_roll_duration);
                    path
                }
                None => inner.pre_roll.arm(
                    &config.temp_directory,
                    self.factory.file_extension(),
                    config.pre_roll_duration,
                )?,
            }
        };

        let encoder = self.open_encoder(SegmentKind::PreRoll, path, config, rotation)?;
        self.slot
            .install(encoder, SegmentKind::PreRoll, rotation, config.width, config.height);
        Ok(())
    }

    fn open_live(&self, config: &SessionConfig, rotation: Rotation) -> Result<(), CaptureError> {
        files::ensure_directory(&config.output_directory)?;
        let path = files::unique_file_path(
            &config.output_directory,
            "recording",
            self.factory.file_extension(),
        );
        self.inner.lock().live_output_path = Some(path.clone());

        let encoder = self.open_encoder(SegmentKind::Live, path, config, rotation)?;
        self.slot
            .install(encoder, SegmentKind::Live, rotation, config.width, config.height);
        Ok(())
    }

    /// Create and initialize an encoder. Live encoders are also started;
    /// pre-roll encoders only buffer.
    fn open_encoder(
        &self,
        kind: SegmentKind,
        output_path: PathBuf,
        config: &SessionConfig,
        rotation: Rotation,
    ) -> Result<SharedEncoder, CaptureError> {
        let mut encoder = self.factory.create(kind)?;
        let params = EncoderParams {
            output_path,
            width: config.width,
            height: config.height,
            frame_rate: config.frame_rate,
            record_audio: config.record_audio,
            rotation,
            facing: config.facing,
            pre_roll_window: (kind == SegmentKind::PreRoll).then_some(config.pre_roll_duration),
        };

        if let Err(e) = encoder.initialize(&params) {
            encoder.dispose();
            return Err(e);
        }

        if kind == SegmentKind::Live {
            encoder.set_progress_callback(self.progress_forwarder());
            if let Err(e) = encoder.start() {
                encoder.dispose();
                return Err(e);
            }
        }

        log::debug!(
            "{:?} encoder ready: {} ({}x{} @ {} fps)",
            kind,
            params.output_path.display(),
            params.width,
            params.height,
            params.frame_rate
        );
        Ok(Arc::new(Mutex::new(encoder)))
    }

    fn finish_live(&self) -> Result<CapturedMedia, CaptureError> {
        self.set_state(SessionState::Stopping);

        let (pre_roll_duration, rotation) = {
            let inner = self.inner.lock();
            (
                inner.pre_roll.tracked_duration(),
                inner.locked_rotation.unwrap_or_default(),
            )
        };
        let result = self.finalize_live();

        {
            let mut inner = self.inner.lock();
            inner.pre_roll.clear();
            inner.live_output_path = None;
            inner.locked_rotation = None;
        }
        self.set_state(SessionState::Idle);

        match result {
            Ok(media) => {
                if self.config.lock().write_metadata_sidecar {
                    let meta = MediaMetadata::from_media(&media, pre_roll_duration, rotation);
                    if let Err(e) = metadata::write_metadata(&meta, &media.file_path) {
                        log::warn!("Failed to write metadata sidecar: {}", e);
                    }
                }
                log::info!(
                    "Recording finished: {} ({}, {})",
                    media.file_path.display(),
                    media.duration_string(),
                    media.file_size_string()
                );
                if let Some(delegate) = self.delegate() {
                    delegate.on_recording_succeeded(&media);
                }
                Ok(media)
            }
            Err(e) => {
                log::error!("Recording failed: {}", e);
                self.notify_failed(&e);
                Err(e)
            }
        }
    }

    fn finalize_live(&self) -> Result<CapturedMedia, CaptureError> {
        let segment = self.slot.take().ok_or(CaptureError::NoActiveEncoder)?;
        let live = finish_encoder(&segment.encoder)?;

        let pre_roll = self.inner.lock().pre_roll.segment().cloned();
        match pre_roll {
            Some(pre_roll) => mux_segments(self.muxer.as_ref(), &pre_roll, &live),
            None => Ok(live),
        }
    }

    /// Graceful stop of an uncommitted pre-roll: finalize, then throw it away.
    fn discard_pre_roll(&self) {
        self.set_state(SessionState::Stopping);
        if let Some(segment) = self.slot.take() {
            if let Err(e) = finish_encoder(&segment.encoder) {
                log::warn!("Pre-roll finalization failed while stopping: {}", e);
            }
        }
        {
            let mut inner = self.inner.lock();
            inner.pre_roll.clear();
            inner.locked_rotation = None;
        }
        self.set_state(SessionState::Idle);
        log::info!("Pre-roll stopped without commit, nothing kept");
    }

    /// Abort body; the caller holds the transition guard.
    fn abort_now(&self) {
        self.tear_down(ABORT_LOCK_TIMEOUT);
    }

    /// Waits at most `lock_wait` for a busy encoder before parking it for the
    /// pump worker.
    fn tear_down(&self, lock_wait: Duration) {
        let (previous, live_path) = {
            let mut inner = self.inner.lock();
            (inner.state, inner.live_output_path.take())
        };
        if previous.is_recording() {
            self.set_state(SessionState::Stopping);
        }

        if let Some(segment) = self.slot.take() {
            self.discard_encoder(segment.encoder, lock_wait);
        }
        {
            let mut inner = self.inner.lock();
            inner.pre_roll.clear();
            inner.locked_rotation = None;
        }
        if let Some(path) = live_path {
            files::remove_if_exists(&path);
        }

        if !previous.is_idle() {
            self.set_state(SessionState::Idle);
            log::info!("Session aborted");
        }
    }

    /// Undo a failed start: no encoder, no temp files, back to Idle.
    fn roll_back(&self) {
        if let Some(segment) = self.slot.take() {
            self.discard_encoder(segment.encoder, ABORT_LOCK_TIMEOUT);
        }
        let live_path = {
            let mut inner = self.inner.lock();
            inner.pre_roll.clear();
            inner.locked_rotation = None;
            inner.live_output_path.take()
        };
        if let Some(path) = live_path {
            files::remove_if_exists(&path);
        }
        self.set_state(SessionState::Idle);
    }

    /// Dispose without finalizing. An encoder stuck inside a frame submission
    /// is parked in the slot and disposed by the pump worker once it returns.
    fn discard_encoder(&self, encoder: SharedEncoder, lock_wait: Duration) {
        let disposed = {
            let locked = if lock_wait.is_zero() {
                encoder.try_lock()
            } else {
                encoder.try_lock_for(lock_wait)
            };
            match locked {
                Some(mut locked) => {
                    locked.dispose();
                    true
                }
                None => false,
            }
        };
        if !disposed {
            log::warn!("Encoder still busy after {:?}, detaching until its frame returns", lock_wait);
            self.slot.park(encoder);
            // the frame may have returned before the encoder was parked
            self.slot.dispose_parked();
        }
    }

    fn set_state(&self, state: SessionState) {
        let changed = {
            let mut inner = self.inner.lock();
            let changed = inner.state != state;
            inner.state = state;
            changed
        };
        if changed {
            log::debug!("Session {} → {}", self.id, state.as_str());
            if let Some(delegate) = self.delegate() {
                delegate.on_state_changed(state);
            }
        }
    }

    fn delegate(&self) -> Option<Arc<dyn SessionDelegate>> {
        self.delegate.read().clone()
    }

    fn notify_started(&self) {
        if let Some(delegate) = self.delegate() {
            delegate.on_recording_started();
        }
    }

    fn notify_failed(&self, error: &CaptureError) {
        if let Some(delegate) = self.delegate() {
            delegate.on_recording_failed(error);
        }
    }

    fn progress_forwarder(&self) -> ProgressCallback {
        let delegate = Arc::clone(&self.delegate);
        Arc::new(move |duration: Duration| {
            let current = delegate.read().clone();
            if let Some(d) = current {
                d.on_recording_progress(duration);
            }
        })
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if !self.slot.is_empty() || !self.state().is_idle() {
            self.tear_down(Duration::ZERO);
        }
    }
}

fn busy() -> CaptureError {
    CaptureError::InvalidState("another session transition is in progress".into())
}

/// Wait for any in-flight frame, then `stop()` and release the encoder.
fn finish_encoder(encoder: &SharedEncoder) -> Result<CapturedMedia, CaptureError> {
    let mut encoder = encoder.lock();
    let result = encoder.stop();
    encoder.dispose();
    result
}
