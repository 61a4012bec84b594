use std::path::Path;

use chrono::Utc;

use crate::models::captured_media::CapturedMedia;
use crate::models::error::CaptureError;
use crate::session::preroll::PreRollSegment;
use crate::storage::files;
use crate::traits::muxer::{MuxRequest, Muxer};

/// Splice a finalized pre-roll segment in front of a finalized live segment.
///
/// On success the returned media points at a new file next to the live
/// segment and the standalone live file is deleted. On failure any partial
/// output is deleted, the live file is kept, and the error is returned.
pub fn mux_segments(
    muxer: &dyn Muxer,
    pre_roll: &PreRollSegment,
    live: &CapturedMedia,
) -> Result<CapturedMedia, CaptureError> {
    check_input("pre-roll", &pre_roll.path)?;
    check_input("live", &live.file_path)?;

    let directory = live
        .file_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let extension = files::extension_or(&live.file_path, "vcap");
    let output_path = files::unique_file_path(directory, "muxed", extension);

    let request = MuxRequest {
        pre_roll_path: pre_roll.path.clone(),
        live_path: live.file_path.clone(),
        output_path: output_path.clone(),
        pre_roll_duration: pre_roll.duration,
    };

    log::info!(
        "Muxing {} + {} → {}",
        request.pre_roll_path.display(),
        request.live_path.display(),
        output_path.display()
    );

    let outcome = match muxer.mux(&request) {
        Ok(outcome) => outcome,
        Err(e) => {
            files::remove_if_exists(&output_path);
            log::error!("Mux failed, live segment kept at {}: {}", live.file_path.display(), e);
            return Err(match e {
                CaptureError::MuxFailed(_) => e,
                other => CaptureError::MuxFailed(other.to_string()),
            });
        }
    };

    let Some(file_size_bytes) = files::file_size(&output_path).filter(|&len| len > 0) else {
        files::remove_if_exists(&output_path);
        return Err(CaptureError::MuxFailed(format!(
            "muxer produced no output at {}",
            output_path.display()
        )));
    };

    let checksum = match files::sha256_file(&output_path) {
        Ok(sum) => Some(sum),
        Err(e) => {
            log::warn!("Could not checksum {}: {}", output_path.display(), e);
            None
        }
    };

    let media = CapturedMedia {
        file_path: output_path,
        duration: outcome.duration.unwrap_or(live.duration),
        file_size_bytes,
        created_at: Utc::now(),
        facing: live.facing,
        frame_count: outcome.frame_count.unwrap_or(live.frame_count),
        checksum,
    };

    files::remove_if_exists(&live.file_path);
    Ok(media)
}

fn check_input(label: &str, path: &Path) -> Result<(), CaptureError> {
    if files::is_usable_media_file(path) {
        Ok(())
    } else {
        Err(CaptureError::MuxFailed(format!(
            "{} segment missing or empty: {}",
            label,
            path.display()
        )))
    }
}
