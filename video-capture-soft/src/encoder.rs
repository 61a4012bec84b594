use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use video_capture_core::models::config::MAX_PRE_ROLL_DURATION;
use video_capture_core::storage::files;
use video_capture_core::{
    CaptureError, CapturedMedia, DrawableFrame, EncoderFactory, EncoderParams, EncoderStats, EncoderStatus,
    FrameEncoder, FrameInfo, ProgressCallback, SegmentKind,
};

use crate::canvas::SoftwareCanvas;
use crate::container::{self, ContainerHeader, ContainerWriter, EncodedFrame};
use crate::frame_ring::FrameRing;

/// Media time between two progress callbacks.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Portable `FrameEncoder` writing run-length encoded `.vcap` files.
///
/// Before `start()` encoded frames only live in a time-windowed ring; `stop()`
/// on an unstarted encoder writes whatever survived the window, rebased to
/// t = 0. After `start()` every frame streams straight to the output file.
///
/// Usage:
/// 1. `initialize()` with output path and geometry
/// 2. Optionally `start()` to commit to the file
/// 3. `begin_frame()` / draw / `submit_frame()` per frame
/// 4. `stop()` to finalize, or `dispose()` to throw everything away
pub struct SoftwareEncoder {
    kind: SegmentKind,
    params: Option<EncoderParams>,
    header: Option<ContainerHeader>,
    canvas: SoftwareCanvas,
    status: EncoderStatus,
    ring: Option<FrameRing>,
    writer: Option<ContainerWriter>,
    pending: Option<Duration>,
    first_timestamp: Option<Duration>,
    last_timestamp: Option<Duration>,
    frames_encoded: u64,
    bytes_encoded: u64,
    progress: Option<ProgressCallback>,
    last_progress: Duration,
    finalized: bool,
}

impl SoftwareEncoder {
    pub fn new(kind: SegmentKind) -> Self {
        Self {
            kind,
            params: None,
            header: None,
            canvas: SoftwareCanvas::new(0, 0),
            status: EncoderStatus::Idle,
            ring: None,
            writer: None,
            pending: None,
            first_timestamp: None,
            last_timestamp: None,
            frames_encoded: 0,
            bytes_encoded: 0,
            progress: None,
            last_progress: Duration::ZERO,
            finalized: false,
        }
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    /// Frames currently held in the pre-start ring.
    pub fn buffered_frames(&self) -> usize {
        self.ring.as_ref().map_or(0, |r| r.len())
    }

    fn accepts_frames(&self) -> bool {
        matches!(
            self.status,
            EncoderStatus::Initialized | EncoderStatus::Buffering | EncoderStatus::Encoding
        )
    }

    fn header(&self) -> Result<ContainerHeader, CaptureError> {
        self.header
            .ok_or_else(|| CaptureError::InvalidState("encoder not initialized".into()))
    }

    fn interval(&self) -> Duration {
        self.header.map(|h| h.frame_interval()).unwrap_or_default()
    }

    fn report_progress(&mut self) {
        let (Some(first), Some(last)) = (self.first_timestamp, self.last_timestamp) else {
            return;
        };
        let media = last.saturating_sub(first) + self.interval();
        if media < self.last_progress + PROGRESS_INTERVAL {
            return;
        }
        self.last_progress = media;
        if let Some(callback) = &self.progress {
            callback(media);
        }
    }

    /// Write the ring to `path` with timestamps rebased to zero.
    fn write_buffered(&mut self, path: &Path, header: &ContainerHeader) -> Result<(u64, Duration), CaptureError> {
        let frames = self.ring.as_mut().map(|r| r.drain()).unwrap_or_default();
        let duration = container::span_duration(&frames, header.frame_interval());
        let Some(base) = frames.first().map(|f| f.timestamp) else {
            return Ok((0, Duration::ZERO));
        };

        let mut writer = ContainerWriter::create(path, header).map_err(finalize_error)?;
        for frame in &frames {
            writer
                .write_frame(frame.timestamp - base, &frame.payload)
                .map_err(finalize_error)?;
        }
        let summary = writer.finish().map_err(finalize_error)?;
        Ok((summary.frame_count, duration))
    }

    fn describe(&self, path: PathBuf, frame_count: u64, duration: Duration) -> CapturedMedia {
        let file_size_bytes = files::file_size(&path).unwrap_or(0);
        let checksum = if file_size_bytes > 0 {
            files::sha256_file(&path)
                .map_err(|e| log::warn!("Could not checksum {}: {}", path.display(), e))
                .ok()
        } else {
            None
        };
        CapturedMedia {
            file_path: path,
            duration,
            file_size_bytes,
            created_at: Utc::now(),
            facing: self.params.as_ref().map(|p| p.facing).unwrap_or_default(),
            frame_count,
            checksum,
        }
    }
}

fn finalize_error(err: container::ContainerError) -> CaptureError {
    CaptureError::FinalizationFailed(err.to_string())
}

impl FrameEncoder for SoftwareEncoder {
    fn initialize(&mut self, params: &EncoderParams) -> Result<(), CaptureError> {
        if self.status != EncoderStatus::Idle {
            return Err(CaptureError::InvalidState(format!(
                "initialize called in {:?}",
                self.status
            )));
        }
        if params.width == 0 || params.height == 0 {
            return Err(CaptureError::InitializationFailed(format!(
                "invalid frame size {}x{}",
                params.width, params.height
            )));
        }
        if params.frame_rate == 0 {
            return Err(CaptureError::InitializationFailed("frame rate must be non-zero".into()));
        }
        if params.output_path.as_os_str().is_empty() {
            return Err(CaptureError::InitializationFailed("empty output path".into()));
        }
        if params.record_audio {
            log::warn!("Software encoder has no audio track; ignoring record_audio");
        }

        let header = ContainerHeader {
            width: params.width,
            height: params.height,
            frame_rate: params.frame_rate,
            rotation: params.rotation,
        };
        let window = params
            .pre_roll_window
            .unwrap_or(MAX_PRE_ROLL_DURATION)
            .min(MAX_PRE_ROLL_DURATION);
        let max_frames = (window.as_secs_f64() * params.frame_rate as f64).ceil() as usize;

        self.canvas = SoftwareCanvas::new(params.width, params.height);
        self.ring = Some(FrameRing::new(window, max_frames));
        self.header = Some(header);
        self.params = Some(params.clone());
        self.status = EncoderStatus::Initialized;

        log::debug!(
            "Software {:?} encoder initialized: {}x{} @ {} fps, window {:?}",
            self.kind,
            params.width,
            params.height,
            params.frame_rate,
            params.pre_roll_window
        );
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if !matches!(self.status, EncoderStatus::Initialized | EncoderStatus::Buffering) {
            return Err(CaptureError::InvalidState(format!("start called in {:?}", self.status)));
        }
        let header = self.header()?;
        let path = self
            .params
            .as_ref()
            .map(|p| p.output_path.clone())
            .ok_or_else(|| CaptureError::InvalidState("encoder not initialized".into()))?;

        let mut writer = ContainerWriter::create(&path, &header)
            .map_err(|e| CaptureError::InitializationFailed(e.to_string()))?;

        // anything buffered before the commit goes out first, as recorded
        let buffered = self.ring.as_mut().map(|r| r.drain()).unwrap_or_default();
        for frame in &buffered {
            writer
                .write_frame(frame.timestamp, &frame.payload)
                .map_err(|e| CaptureError::EncodingFailed(e.to_string()))?;
        }
        self.first_timestamp = buffered.first().map(|f| f.timestamp);
        self.last_timestamp = buffered.last().map(|f| f.timestamp);

        self.writer = Some(writer);
        self.status = EncoderStatus::Encoding;
        log::info!("Software encoder writing {}", path.display());
        Ok(())
    }

    fn begin_frame(&mut self, timestamp: Duration) -> Result<DrawableFrame<'_>, CaptureError> {
        if !self.accepts_frames() {
            return Err(CaptureError::InvalidState(format!(
                "begin_frame called in {:?}",
                self.status
            )));
        }
        let header = self.header()?;
        // an unsubmitted frame from a failed render is simply overwritten
        let timestamp = self.last_timestamp.map_or(timestamp, |last| timestamp.max(last));
        self.pending = Some(timestamp);
        self.canvas.reset();

        Ok(DrawableFrame {
            canvas: &mut self.canvas,
            info: FrameInfo {
                width: header.width,
                height: header.height,
                timestamp,
            },
        })
    }

    fn submit_frame(&mut self) -> Result<(), CaptureError> {
        let timestamp = self
            .pending
            .take()
            .ok_or_else(|| CaptureError::EncodingFailed("submit_frame without begin_frame".into()))?;
        if !self.accepts_frames() {
            return Err(CaptureError::InvalidState(format!(
                "submit_frame called in {:?}",
                self.status
            )));
        }

        let payload = container::encode_rle(self.canvas.pixels());
        let len = payload.len() as u64;

        match self.writer.as_mut() {
            Some(writer) => writer
                .write_frame(timestamp, &payload)
                .map_err(|e| CaptureError::EncodingFailed(e.to_string()))?,
            None => {
                let ring = self
                    .ring
                    .as_mut()
                    .ok_or_else(|| CaptureError::InvalidState("encoder not initialized".into()))?;
                ring.push(EncodedFrame { timestamp, payload });
                self.status = EncoderStatus::Buffering;
            }
        }

        self.frames_encoded += 1;
        self.bytes_encoded += len;
        self.first_timestamp.get_or_insert(timestamp);
        self.last_timestamp = Some(timestamp);
        self.report_progress();
        Ok(())
    }

    fn stop(&mut self) -> Result<CapturedMedia, CaptureError> {
        if !self.accepts_frames() {
            return Err(CaptureError::InvalidState(format!("stop called in {:?}", self.status)));
        }
        // from here on the output belongs to the caller, finished or not
        self.finalized = true;
        self.pending = None;

        let header = self.header()?;
        let path = self
            .params
            .as_ref()
            .map(|p| p.output_path.clone())
            .ok_or_else(|| CaptureError::InvalidState("encoder not initialized".into()))?;

        let (frame_count, duration) = match self.writer.take() {
            Some(writer) => {
                let summary = writer.finish().map_err(finalize_error)?;
                let duration = match (summary.first_timestamp, summary.last_timestamp) {
                    (Some(first), Some(last)) => last.saturating_sub(first) + header.frame_interval(),
                    _ => Duration::ZERO,
                };
                (summary.frame_count, duration)
            }
            None => self.write_buffered(&path, &header)?,
        };
        self.status = EncoderStatus::Stopped;

        if frame_count == 0 && self.kind == SegmentKind::PreRoll {
            log::debug!("Pre-roll encoder stopped with no frames, nothing written");
        }
        let media = self.describe(path, frame_count, duration);
        log::info!(
            "Software encoder finalized {} ({} frames, {:?}, {})",
            media.file_path.display(),
            media.frame_count,
            media.duration,
            media.file_size_string()
        );
        Ok(media)
    }

    fn dispose(&mut self) {
        if self.status == EncoderStatus::Disposed {
            return;
        }
        let writer = self.writer.take();
        let had_writer = writer.is_some();
        drop(writer);

        if !self.finalized && had_writer {
            if let Some(params) = &self.params {
                files::remove_if_exists(&params.output_path);
            }
        }
        if let Some(ring) = self.ring.as_mut() {
            ring.reset();
        }
        self.pending = None;
        self.progress = None;
        self.status = EncoderStatus::Disposed;
    }

    fn is_recording(&self) -> bool {
        self.status == EncoderStatus::Encoding
    }

    fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }

    fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_encoded: self.bytes_encoded,
            status: self.status,
        }
    }
}

impl Drop for SoftwareEncoder {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Builds `SoftwareEncoder`s; selected when no platform encoder is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareEncoderFactory;

impl SoftwareEncoderFactory {
    pub fn new() -> Self {
        Self
    }
}

impl EncoderFactory for SoftwareEncoderFactory {
    fn create(&self, kind: SegmentKind) -> Result<Box<dyn FrameEncoder>, CaptureError> {
        Ok(Box::new(SoftwareEncoder::new(kind)))
    }

    fn file_extension(&self) -> &str {
        "vcap"
    }
}
