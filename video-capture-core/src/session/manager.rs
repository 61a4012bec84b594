use std::sync::{Arc, Weak};
use std::time::Duration;

use uuid::Uuid;

use crate::models::config::SessionConfig;
use crate::models::error::CaptureError;
use crate::session::recording::RecordingSession;
use crate::session::registry::SessionRegistry;
use crate::session::restart::{RestartCallback, RestartScheduler, SettingChange, DEFAULT_SETTLE};
use crate::traits::frame_encoder::EncoderFactory;
use crate::traits::muxer::Muxer;

/// Process-level owner of recording sessions.
///
/// Picks the encoder backend (through the factory) and the muxer once, hands
/// them to every session it opens, and keeps the registry used to stop
/// everything when the application is paused.
pub struct CaptureManager {
    factory: Arc<dyn EncoderFactory>,
    muxer: Arc<dyn Muxer>,
    registry: SessionRegistry,
    restart_settle: Duration,
}

impl CaptureManager {
    pub fn new(factory: Arc<dyn EncoderFactory>, muxer: Arc<dyn Muxer>) -> Self {
        Self {
            factory,
            muxer,
            registry: SessionRegistry::new(),
            restart_settle: DEFAULT_SETTLE,
        }
    }

    /// Override the restart settle window for sessions opened afterwards.
    pub fn with_restart_settle(mut self, settle: Duration) -> Self {
        self.restart_settle = settle;
        self
    }

    /// Build, wire and register a new session.
    pub fn open_session(&self, config: SessionConfig) -> Result<Arc<RecordingSession>, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;

        let session = Arc::new(RecordingSession::new(
            config,
            Arc::clone(&self.factory),
            Arc::clone(&self.muxer),
        ));

        let weak: Weak<RecordingSession> = Arc::downgrade(&session);
        let callback: RestartCallback = Arc::new(move |changes: Vec<SettingChange>| {
            let Some(session) = weak.upgrade() else {
                return;
            };
            log::debug!("Applying {:?} to session {}", changes, session.id());
            if let Err(e) = session.restart_pre_roll() {
                log::warn!("Restart of session {} failed: {}", session.id(), e);
            }
        });
        session.attach_restart_scheduler(RestartScheduler::new(self.restart_settle, callback)?);

        self.registry.register(&session);
        log::info!("Opened capture session {}", session.id());
        Ok(session)
    }

    /// Abort and unregister a session. Returns false if it was not registered.
    pub fn close_session(&self, id: Uuid) -> bool {
        if let Some(session) = self.registry.get(id) {
            session.dispose();
        }
        let removed = self.registry.unregister(id);
        if removed {
            log::info!("Closed capture session {}", id);
        }
        removed
    }

    pub fn session(&self, id: Uuid) -> Option<Arc<RecordingSession>> {
        self.registry.get(id)
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Application pause hook: abort every registered session.
    pub fn pause_all(&self) -> usize {
        self.registry.stop_all()
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        self.registry.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::state::SessionState;
    use crate::testing::{wait_for, ScriptedFactory, ScriptedMuxer};

    const WAIT: Duration = Duration::from_secs(5);

    fn manager() -> (CaptureManager, Arc<ScriptedFactory>) {
        let factory = ScriptedFactory::new(vec![]);
        let manager = CaptureManager::new(factory.clone(), ScriptedMuxer::ok(None))
            .with_restart_settle(Duration::from_millis(30));
        (manager, factory)
    }

    fn config(dir: &tempfile::TempDir, pre_roll: bool) -> SessionConfig {
        SessionConfig {
            width: 64,
            height: 48,
            pre_roll_enabled: pre_roll,
            output_directory: dir.path().join("out"),
            temp_directory: dir.path().join("tmp"),
            ..Default::default()
        }
    }

    #[test]
    fn open_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager();
        let session = manager.open_session(config(&dir, false)).unwrap();
        assert_eq!(manager.session_count(), 1);
        assert!(manager.session(session.id()).is_some());

        session.start_recording().unwrap();
        assert!(manager.close_session(session.id()));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(manager.session_count(), 0);
        assert!(!manager.close_session(session.id()));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager();
        let mut bad = config(&dir, false);
        bad.frame_rate = 0;
        assert!(matches!(
            manager.open_session(bad),
            Err(CaptureError::ConfigurationFailed(_))
        ));
        assert_eq!(manager.session_count(), 0);
    }

    #[test]
    fn pause_all_aborts_everything() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager();
        let a = manager.open_session(config(&dir, false)).unwrap();
        let b = manager.open_session(config(&dir, true)).unwrap();
        a.start_recording().unwrap();
        b.start_recording().unwrap();

        assert_eq!(manager.pause_all(), 2);
        assert_eq!(a.state(), SessionState::Idle);
        assert_eq!(b.state(), SessionState::Idle);
    }

    #[test]
    fn pre_roll_duration_change_restarts_after_settle() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, factory) = manager();
        let session = manager.open_session(config(&dir, true)).unwrap();
        session.start_recording().unwrap();

        session.set_pre_roll_duration(Duration::from_secs(3)).unwrap();
        session.set_pre_roll_duration(Duration::from_secs(4)).unwrap();

        assert!(wait_for(WAIT, || factory.created() == 2));
        assert!(wait_for(WAIT, || session.has_active_encoder()));
        assert_eq!(session.state(), SessionState::PreRoll);
        let windows: Vec<_> = factory
            .log
            .calls
            .lock()
            .iter()
            .filter_map(|c| c.params.as_ref().and_then(|p| p.pre_roll_window))
            .collect();
        assert_eq!(windows, vec![Duration::from_secs(5), Duration::from_secs(4)]);
    }

    #[test]
    fn closed_session_ignores_late_restart() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, factory) = manager();
        let session = manager.open_session(config(&dir, true)).unwrap();
        session.start_recording().unwrap();
        session.reconfigure(SettingChange::FrameRate(24)).unwrap();

        manager.close_session(session.id());
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(factory.created(), 1);
        assert_eq!(session.state(), SessionState::Idle);
    }
}
