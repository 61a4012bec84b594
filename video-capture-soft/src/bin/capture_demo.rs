//! Records a test pattern through the full session pipeline.
//!
//! ```text
//! capture_demo [output_dir] [pre_roll_secs] [live_secs]
//! ```
//!
//! Run with `RUST_LOG=debug` to see the session transitions.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use video_capture_core::storage::metadata;
use video_capture_core::{
    CaptureError, CaptureManager, CapturedMedia, SessionConfig, SessionDelegate, SessionState,
};
use video_capture_soft::{ContainerMuxer, SoftwareEncoderFactory, TestPatternSource};

struct LoggingDelegate;

impl SessionDelegate for LoggingDelegate {
    fn on_state_changed(&self, state: SessionState) {
        log::info!("state → {}", state.as_str());
    }

    fn on_recording_started(&self) {
        log::info!("recording committed");
    }

    fn on_recording_progress(&self, duration: Duration) {
        log::debug!("encoded {:.2}s", duration.as_secs_f64());
    }

    fn on_recording_succeeded(&self, media: &CapturedMedia) {
        log::info!(
            "saved {} ({}, {})",
            media.file_path.display(),
            media.duration_string(),
            media.file_size_string()
        );
    }

    fn on_recording_failed(&self, error: &CaptureError) {
        log::error!("recording failed: {}", error);
    }
}

fn arg_secs(args: &[String], index: usize, default: f64) -> Duration {
    let secs = args
        .get(index)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s > 0.0)
        .unwrap_or(default);
    Duration::from_secs_f64(secs)
}

fn run() -> Result<(), CaptureError> {
    let args: Vec<String> = std::env::args().collect();
    let output_directory = args
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("capture_out"));
    let pre_roll = arg_secs(&args, 2, 2.0);
    let live = arg_secs(&args, 3, 3.0);

    let config = SessionConfig {
        width: 320,
        height: 240,
        frame_rate: 30,
        pre_roll_enabled: true,
        pre_roll_duration: pre_roll,
        temp_directory: output_directory.join("tmp"),
        output_directory,
        diagnostics_enabled: true,
        write_metadata_sidecar: true,
        ..Default::default()
    };

    let manager = CaptureManager::new(Arc::new(SoftwareEncoderFactory::new()), Arc::new(ContainerMuxer::new()));
    let session = manager.open_session(config)?;
    session.set_delegate(Arc::new(LoggingDelegate));

    let mut pump = session.create_pump(Arc::new(TestPatternSource::new(640, 360).unavailable_every(10)))?;
    pump.start_timer()?;

    session.start_recording()?;
    // let the pre-roll window fill up past its limit
    thread::sleep(pre_roll + Duration::from_millis(500));
    session.start_recording()?;
    thread::sleep(live);
    let media = session.stop()?;
    pump.shutdown();

    log::info!("diagnostics: {:?}", session.diagnostics());
    manager.close_session(session.id());

    let Some(media) = media else {
        println!("nothing recorded");
        return Ok(());
    };
    println!("{}", media.file_path.display());
    println!("  duration: {:.3}s", media.duration.as_secs_f64());
    println!("  frames:   {}", media.frame_count);
    println!("  size:     {}", media.file_size_string());
    if let Some(checksum) = &media.checksum {
        println!("  sha256:   {}", checksum);
    }
    match metadata::read_metadata(&media.file_path) {
        Ok(meta) => println!("  sidecar:  pre-roll {:.2}s, rotation {}°", meta.pre_roll_secs, meta.rotation_degrees),
        Err(e) => log::warn!("no sidecar: {}", e),
    }
    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("capture_demo: {}", e);
        std::process::exit(1);
    }
}
