//! Session flows run end to end against the software backend and real files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use video_capture_core::storage::files;
use video_capture_core::{
    CaptureManager, FramePump, RecordingSession, Rotation, SessionConfig, SessionState, StartOutcome,
};

use crate::container::Container;
use crate::{ContainerMuxer, SoftwareEncoderFactory, TestPatternSource};

const WAIT: Duration = Duration::from_secs(5);

struct Rig {
    pump: FramePump,
    session: Arc<RecordingSession>,
    _manager: CaptureManager,
    dir: tempfile::TempDir,
}

fn rig(pre_roll: bool) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let manager = CaptureManager::new(Arc::new(SoftwareEncoderFactory::new()), Arc::new(ContainerMuxer::new()));
    let config = SessionConfig {
        width: 32,
        height: 24,
        frame_rate: 20,
        pre_roll_enabled: pre_roll,
        pre_roll_duration: Duration::from_secs(1),
        output_directory: dir.path().join("out"),
        temp_directory: dir.path().join("tmp"),
        ..Default::default()
    };
    let session = manager.open_session(config).unwrap();
    let pump = session
        .create_pump(Arc::new(TestPatternSource::new(40, 30)))
        .unwrap();
    Rig {
        pump,
        session,
        _manager: manager,
        dir,
    }
}

impl Rig {
    fn out(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn tmp(&self) -> PathBuf {
        self.dir.path().join("tmp")
    }

    fn pump_frames(&self, n: usize) {
        self.pump_paced(n, Duration::from_millis(5));
    }

    fn pump_paced(&self, n: usize, spacing: Duration) {
        for _ in 0..n {
            self.pump.tick();
            assert!(self.pump.wait_idle(WAIT));
            thread::sleep(spacing);
        }
    }
}

fn media_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "vcap"))
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

#[test]
fn pre_roll_then_commit_produces_one_muxed_file() {
    let mut rig = rig(true);
    rig.pump.start_timer().unwrap();

    assert_eq!(rig.session.start_recording().unwrap(), StartOutcome::PreRollStarted);
    thread::sleep(Duration::from_millis(1500));
    assert_eq!(rig.session.start_recording().unwrap(), StartOutcome::Promoted);
    thread::sleep(Duration::from_millis(600));
    let media = rig.session.stop().unwrap().expect("live session produces media");
    rig.pump.stop_timer();

    assert_eq!(rig.session.state(), SessionState::Idle);
    assert!(file_name(&media.file_path).starts_with("muxed_"));
    assert_eq!(media_files(&rig.out()), vec![media.file_path.clone()]);
    assert!(media_files(&rig.tmp()).is_empty());

    let container = Container::read(&media.file_path).unwrap();
    assert_eq!((container.header.width, container.header.height), (32, 24));
    assert_eq!(container.frames.len() as u64, media.frame_count);
    assert_eq!(container.frames[0].timestamp, Duration::ZERO);
    assert!(container
        .frames
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));

    // the pre-roll window caps what survives before the commit
    assert!(media.duration > Duration::from_millis(600));
    assert!(media.duration < Duration::from_millis(2600));
    assert_relative_eq!(
        container.duration().as_secs_f64(),
        media.duration.as_secs_f64(),
        epsilon = 1e-3
    );

    assert_eq!(media.file_size_bytes, fs::metadata(&media.file_path).unwrap().len());
    assert_eq!(
        media.checksum.as_deref(),
        Some(files::sha256_file(&media.file_path).unwrap().as_str())
    );
}

#[test]
fn muxed_duration_is_window_plus_live() {
    let rig = rig(true);
    let interval = Duration::from_millis(50);
    let window = Duration::from_secs(1);

    rig.session.start_recording().unwrap();
    // half a window more than the buffer holds
    rig.pump_paced(30, interval);
    assert_eq!(rig.session.start_recording().unwrap(), StartOutcome::Promoted);

    let live_started = Instant::now();
    rig.pump_paced(10, interval);
    let live_span = live_started.elapsed() - interval;
    let media = rig.session.stop().unwrap().unwrap();

    assert!(file_name(&media.file_path).starts_with("muxed_"));
    let container = Container::read(&media.file_path).unwrap();
    assert_eq!(container.frames.len() as u64, media.frame_count);
    let pre_frames = container.frames.len() - 10;
    assert!(pre_frames <= 20, "pre-roll kept {} frames", pre_frames);

    // live frames start where the trimmed pre-roll ends
    let offset = container.frames[pre_frames].timestamp;
    assert!(container.frames[pre_frames - 1].timestamp < offset);
    assert_relative_eq!(offset.as_secs_f64(), window.as_secs_f64(), epsilon = 0.1);

    assert_relative_eq!(
        media.duration.as_secs_f64(),
        (window + live_span).as_secs_f64(),
        epsilon = 0.15
    );
    assert_relative_eq!(
        container.duration().as_secs_f64(),
        media.duration.as_secs_f64(),
        epsilon = 1e-3
    );
}

#[test]
fn live_without_pre_roll_is_not_muxed() {
    let rig = rig(false);
    assert_eq!(rig.session.start_recording().unwrap(), StartOutcome::LiveStarted);
    rig.pump_frames(6);
    let media = rig.session.stop().unwrap().unwrap();

    assert!(file_name(&media.file_path).starts_with("recording_"));
    assert_eq!(media.frame_count, 6);
    assert_eq!(media_files(&rig.out()).len(), 1);

    let container = Container::read(&media.file_path).unwrap();
    assert_eq!(container.frames.len(), 6);
    assert_eq!(container.decode_frame(5).unwrap().len(), 32 * 24 * 4);
}

#[test]
fn uncommitted_pre_roll_leaves_nothing_behind() {
    let rig = rig(true);
    rig.session.start_recording().unwrap();
    rig.pump_frames(5);

    assert_eq!(rig.session.stop().unwrap(), None);
    assert_eq!(rig.session.state(), SessionState::Idle);
    assert!(media_files(&rig.tmp()).is_empty());
    assert!(media_files(&rig.out()).is_empty());
}

#[test]
fn empty_pre_roll_degrades_to_live_only() {
    let rig = rig(true);
    assert_eq!(rig.session.start_recording().unwrap(), StartOutcome::PreRollStarted);
    assert_eq!(rig.session.start_recording().unwrap(), StartOutcome::Promoted);
    rig.pump_frames(4);

    let media = rig.session.stop().unwrap().unwrap();
    assert!(file_name(&media.file_path).starts_with("recording_"));
    assert_eq!(media.frame_count, 4);
    assert!(media_files(&rig.tmp()).is_empty());
}

#[test]
fn abort_during_live_deletes_partial_output() {
    let rig = rig(false);
    rig.session.start_recording().unwrap();
    rig.pump_frames(3);
    assert_eq!(media_files(&rig.out()).len(), 1);

    rig.session.abort();
    assert_eq!(rig.session.state(), SessionState::Idle);
    assert!(media_files(&rig.out()).is_empty());
}

#[test]
fn locked_rotation_is_written_to_the_container() {
    let rig = rig(false);
    rig.session.set_device_rotation(90);
    rig.session.start_recording().unwrap();
    // later device turns do not affect the running segment
    rig.session.set_device_rotation(180);
    rig.pump_frames(2);

    let media = rig.session.stop().unwrap().unwrap();
    let container = Container::read(&media.file_path).unwrap();
    assert_eq!(container.header.rotation, Rotation::Deg90);
}

#[test]
fn second_recording_after_mux_gets_a_fresh_pre_roll() {
    let rig = rig(true);
    rig.session.start_recording().unwrap();
    rig.pump_frames(3);
    rig.session.start_recording().unwrap();
    rig.pump_frames(3);
    let first = rig.session.stop().unwrap().unwrap();
    assert!(file_name(&first.file_path).starts_with("muxed_"));
    assert_eq!(first.frame_count, 6);

    assert_eq!(rig.session.start_recording().unwrap(), StartOutcome::PreRollStarted);
    rig.pump_frames(2);
    rig.session.start_recording().unwrap();
    rig.pump_frames(2);
    let second = rig.session.stop().unwrap().unwrap();

    assert_ne!(first.file_path, second.file_path);
    assert_eq!(second.frame_count, 4);
    assert_eq!(media_files(&rig.out()).len(), 2);
    assert!(media_files(&rig.tmp()).is_empty());
}
