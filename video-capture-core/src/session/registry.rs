use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::session::recording::RecordingSession;

/// Sessions known to the capture manager.
///
/// Holds weak references only: registration never keeps a session alive, and
/// dead entries are pruned on every pass.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<Vec<(Uuid, Weak<RecordingSession>)>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: &Arc<RecordingSession>) {
        let mut sessions = self.sessions.lock();
        sessions.retain(|(_, weak)| weak.strong_count() > 0);
        if sessions.iter().any(|(id, _)| *id == session.id()) {
            return;
        }
        sessions.push((session.id(), Arc::downgrade(session)));
        log::debug!("Registered session {} ({} active)", session.id(), sessions.len());
    }

    /// Returns true if `id` was registered.
    pub fn unregister(&self, id: Uuid) -> bool {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|(sid, weak)| *sid != id && weak.strong_count() > 0);
        let removed = sessions.len() < before;
        if removed {
            log::debug!("Unregistered session {}", id);
        }
        removed
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<RecordingSession>> {
        self.sessions
            .lock()
            .iter()
            .find(|(sid, _)| *sid == id)
            .and_then(|(_, weak)| weak.upgrade())
    }

    /// Live sessions, pruning entries whose session was dropped.
    pub fn sessions(&self) -> Vec<Arc<RecordingSession>> {
        let mut sessions = self.sessions.lock();
        sessions.retain(|(_, weak)| weak.strong_count() > 0);
        sessions.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
    }

    /// Abort every registered session. Returns how many were recording.
    pub fn stop_all(&self) -> usize {
        // snapshot first: abort may call back into delegates that touch the registry
        let sessions = self.sessions();
        let mut stopped = 0;
        for session in sessions {
            if !session.state().is_idle() {
                stopped += 1;
            }
            session.abort();
        }
        if stopped > 0 {
            log::info!("Stopped {} recording session(s)", stopped);
        }
        stopped
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
