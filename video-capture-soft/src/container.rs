//! `.vcap` container reading and writing.
//!
//! ## File Format
//! ```text
//! [4 bytes]  Magic: "VCAP"
//! [2 bytes]  Version: u16 LE (1)
//! [4 bytes]  Width: u32 LE
//! [4 bytes]  Height: u32 LE
//! [4 bytes]  Frame rate: u32 LE
//! [2 bytes]  Rotation in degrees: u16 LE (0, 90, 180, 270)
//! Repeated frame records:
//!   [8 bytes]  Timestamp in microseconds: u64 LE
//!   [4 bytes]  Payload length: u32 LE
//!   [N bytes]  Payload: run-length encoded RGBA pixels
//! ```
//!
//! A payload is a sequence of 5-byte runs `count u8, r, g, b, a`, each
//! repeating one pixel `count` times (1..=255).

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use video_capture_core::{CaptureError, Rotation};

pub const MAGIC: &[u8; 4] = b"VCAP";
pub const VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 20;
pub const RECORD_HEADER_SIZE: usize = 12;

const RUN_SIZE: usize = 5;
const MAX_RUN: usize = u8::MAX as usize;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a .vcap file")]
    BadMagic,

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u16),

    #[error("invalid rotation {0}")]
    InvalidRotation(u16),

    #[error("truncated data at offset {0}")]
    Truncated(usize),

    #[error("corrupt frame payload: {0}")]
    CorruptPayload(String),
}

impl From<ContainerError> for CaptureError {
    fn from(err: ContainerError) -> Self {
        CaptureError::StorageError(err.to_string())
    }
}

/// Stream parameters stored once at the start of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub rotation: Rotation,
}

impl ContainerHeader {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(MAGIC);
        header[4..6].copy_from_slice(&VERSION.to_le_bytes());
        header[6..10].copy_from_slice(&self.width.to_le_bytes());
        header[10..14].copy_from_slice(&self.height.to_le_bytes());
        header[14..18].copy_from_slice(&self.frame_rate.to_le_bytes());
        header[18..20].copy_from_slice(&(self.rotation.degrees() as u16).to_le_bytes());
        header
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ContainerError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ContainerError::Truncated(bytes.len()));
        }
        if &bytes[0..4] != MAGIC {
            return Err(ContainerError::BadMagic);
        }
        let version = read_u16(bytes, 4);
        if version != VERSION {
            return Err(ContainerError::UnsupportedVersion(version));
        }
        let rotation = match read_u16(bytes, 18) {
            0 => Rotation::Deg0,
            90 => Rotation::Deg90,
            180 => Rotation::Deg180,
            270 => Rotation::Deg270,
            other => return Err(ContainerError::InvalidRotation(other)),
        };
        Ok(Self {
            width: read_u32(bytes, 6),
            height: read_u32(bytes, 10),
            frame_rate: read_u32(bytes, 14),
            rotation,
        })
    }
}

/// One encoded frame and its segment-relative timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub timestamp: Duration,
    pub payload: Vec<u8>,
}

/// A fully parsed container.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub header: ContainerHeader,
    pub frames: Vec<EncodedFrame>,
}

impl Container {
    /// Read and parse the container at `path`.
    pub fn read(path: &Path) -> Result<Self, ContainerError> {
        let bytes = fs::read(path)?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ContainerError> {
        let header = ContainerHeader::decode(bytes)?;
        let mut frames = Vec::new();
        let mut offset = HEADER_SIZE;
        while offset < bytes.len() {
            if bytes.len() - offset < RECORD_HEADER_SIZE {
                return Err(ContainerError::Truncated(offset));
            }
            let micros = read_u64(bytes, offset);
            let len = read_u32(bytes, offset + 8) as usize;
            let start = offset + RECORD_HEADER_SIZE;
            let end = start
                .checked_add(len)
                .filter(|&end| end <= bytes.len())
                .ok_or(ContainerError::Truncated(offset))?;
            frames.push(EncodedFrame {
                timestamp: Duration::from_micros(micros),
                payload: bytes[start..end].to_vec(),
            });
            offset = end;
        }
        Ok(Self { header, frames })
    }

    /// Last timestamp minus first, plus one frame interval. Zero when empty.
    pub fn duration(&self) -> Duration {
        span_duration(&self.frames, self.header.frame_interval())
    }

    /// Decode the pixels of frame `index`.
    pub fn decode_frame(&self, index: usize) -> Result<Vec<u8>, ContainerError> {
        let frame = self
            .frames
            .get(index)
            .ok_or_else(|| ContainerError::CorruptPayload(format!("no frame {}", index)))?;
        decode_rle(&frame.payload, self.header.pixel_count())
    }
}

/// Duration covered by `frames`, counting the last frame's display interval.
pub fn span_duration(frames: &[EncodedFrame], interval: Duration) -> Duration {
    match (frames.first(), frames.last()) {
        (Some(first), Some(last)) => last.timestamp.saturating_sub(first.timestamp) + interval,
        _ => Duration::ZERO,
    }
}

/// What a closed writer put on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerSummary {
    pub frame_count: u64,
    pub first_timestamp: Option<Duration>,
    pub last_timestamp: Option<Duration>,
    pub bytes_written: u64,
}

/// Sequential `.vcap` writer.
///
/// Usage:
/// 1. `create()` writes the header
/// 2. `write_frame()` appends records
/// 3. `finish()` flushes and syncs
pub struct ContainerWriter {
    file: BufWriter<File>,
    path: PathBuf,
    summary: ContainerSummary,
}

impl ContainerWriter {
    pub fn create(path: &Path, header: &ContainerHeader) -> Result<Self, ContainerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(&header.encode())?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            summary: ContainerSummary {
                bytes_written: HEADER_SIZE as u64,
                ..Default::default()
            },
        })
    }

    pub fn write_frame(&mut self, timestamp: Duration, payload: &[u8]) -> Result<(), ContainerError> {
        let len = u32::try_from(payload.len())
            .map_err(|_| ContainerError::CorruptPayload(format!("payload too large: {}", payload.len())))?;
        let micros = timestamp.as_micros() as u64;

        let mut record = [0u8; RECORD_HEADER_SIZE];
        record[0..8].copy_from_slice(&micros.to_le_bytes());
        record[8..12].copy_from_slice(&len.to_le_bytes());
        self.file.write_all(&record)?;
        self.file.write_all(payload)?;

        self.summary.frame_count += 1;
        self.summary.first_timestamp.get_or_insert(timestamp);
        self.summary.last_timestamp = Some(timestamp);
        self.summary.bytes_written += (RECORD_HEADER_SIZE + payload.len()) as u64;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn summary(&self) -> ContainerSummary {
        self.summary
    }

    pub fn finish(mut self) -> Result<ContainerSummary, ContainerError> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(self.summary)
    }
}

/// Run-length encode tightly packed RGBA pixels.
pub fn encode_rle(pixels: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunks = pixels.chunks_exact(4);
    let Some(first) = chunks.next() else {
        return out;
    };

    let mut current = first;
    let mut run = 1usize;
    for px in chunks {
        if px == current && run < MAX_RUN {
            run += 1;
        } else {
            push_run(&mut out, run, current);
            current = px;
            run = 1;
        }
    }
    push_run(&mut out, run, current);
    out
}

fn push_run(out: &mut Vec<u8>, run: usize, px: &[u8]) {
    out.push(run as u8);
    out.extend_from_slice(px);
}

/// Decode a run-length payload that must expand to exactly `pixel_count` pixels.
pub fn decode_rle(payload: &[u8], pixel_count: usize) -> Result<Vec<u8>, ContainerError> {
    if payload.len() % RUN_SIZE != 0 {
        return Err(ContainerError::CorruptPayload(format!(
            "payload length {} is not a multiple of {}",
            payload.len(),
            RUN_SIZE
        )));
    }

    let mut pixels = Vec::with_capacity(pixel_count * 4);
    for run in payload.chunks_exact(RUN_SIZE) {
        let count = run[0] as usize;
        if count == 0 {
            return Err(ContainerError::CorruptPayload("zero-length run".into()));
        }
        for _ in 0..count {
            pixels.extend_from_slice(&run[1..RUN_SIZE]);
        }
        if pixels.len() > pixel_count * 4 {
            break;
        }
    }

    if pixels.len() != pixel_count * 4 {
        return Err(ContainerError::CorruptPayload(format!(
            "expected {} pixels, decoded {}",
            pixel_count,
            pixels.len() / 4
        )));
    }
    Ok(pixels)
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}
