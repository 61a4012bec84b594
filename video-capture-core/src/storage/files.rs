use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;

/// Collision-free file path: `{dir}/{prefix}_{yyyyMMdd_HHmmss}_{uuid}.{ext}`.
pub fn unique_file_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let id = uuid::Uuid::new_v4().simple();
    dir.join(format!("{}_{}_{}.{}", prefix, stamp, id, extension))
}

/// Extension of `path` without the dot, or `fallback`.
pub fn extension_or<'a>(path: &'a Path, fallback: &'a str) -> &'a str {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or(fallback)
}

/// Size of the file at `path`, or `None` if it does not exist.
pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().filter(|m| m.is_file()).map(|m| m.len())
}

/// A media file is usable as mux input only if it exists and is non-empty.
pub fn is_usable_media_file(path: &Path) -> bool {
    matches!(file_size(path), Some(len) if len > 0)
}

/// Delete `path` if present. Failures are logged, never returned.
///
/// Returns true when a file was removed.
pub fn remove_if_exists(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!("Deleted {}", path.display());
            true
        }
        Err(e) => {
            log::warn!("Failed to delete {}: {}", path.display(), e);
            false
        }
    }
}

/// Create `dir` and its parents if needed.
pub fn ensure_directory(dir: &Path) -> Result<(), CaptureError> {
    fs::create_dir_all(dir).map_err(|e| CaptureError::storage("failed to create directory", e))
}

/// Hex SHA-256 of the file at `path`, streamed in 64 KiB chunks.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let mut file = File::open(path).map_err(|e| CaptureError::storage("failed to open for checksum", e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| CaptureError::storage("failed to read for checksum", e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
