use std::mem;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::models::error::CaptureError;
use crate::models::frame::CameraFacing;

/// Quiet period after the last change before a restart runs.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

/// A setting whose change requires the active encoder to be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingChange {
    PreRollDuration(Duration),
    Resolution { width: u32, height: u32 },
    FrameRate(u32),
    Facing(CameraFacing),
}

impl SettingChange {
    fn same_setting(&self, other: &SettingChange) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPhase {
    Idle,
    /// Changes received, waiting for the settle window to pass quietly.
    PendingSettle,
    /// The restart callback is running.
    Restarting,
}

/// Called once per settled batch with the latest value of each changed setting.
pub type RestartCallback = Arc<dyn Fn(Vec<SettingChange>) + Send + Sync + 'static>;

struct SchedulerState {
    phase: RestartPhase,
    pending: Vec<SettingChange>,
    deadline: Option<Instant>,
    shutdown: bool,
}

struct SchedulerShared {
    state: Mutex<SchedulerState>,
    cond: Condvar,
    settle: Duration,
    callback: RestartCallback,
}

/// Debounces setting changes into a single restart.
///
/// ```text
/// request ─→ PendingSettle ──(settle elapsed)──→ Restarting ──→ Idle
///               ↑    │ request: deadline pushed out      │
///               │    └───────────────┘                   │
///               └─────── request during restart ─────────┘
/// ```
pub struct RestartScheduler {
    shared: Arc<SchedulerShared>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl RestartScheduler {
    pub fn new(settle: Duration, callback: RestartCallback) -> Result<Self, CaptureError> {
        let shared = Arc::new(SchedulerShared {
            state: Mutex::new(SchedulerState {
                phase: RestartPhase::Idle,
                pending: Vec::new(),
                deadline: None,
                shutdown: false,
            }),
            cond: Condvar::new(),
            settle,
            callback,
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("restart-scheduler".into())
            .spawn(move || run(worker))
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn restart scheduler: {}", e)))?;

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue `change` and restart the settle window.
    pub fn request(&self, change: SettingChange) {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return;
        }
        match state.pending.iter_mut().find(|c| c.same_setting(&change)) {
            Some(existing) => *existing = change,
            None => state.pending.push(change),
        }
        state.deadline = Some(Instant::now() + self.shared.settle);
        if state.phase == RestartPhase::Idle {
            state.phase = RestartPhase::PendingSettle;
        }
        log::debug!("Restart requested ({:?}), settling", change);
        self.shared.cond.notify_all();
    }

    pub fn phase(&self) -> RestartPhase {
        self.shared.state.lock().phase
    }

    pub fn pending(&self) -> Vec<SettingChange> {
        self.shared.state.lock().pending.clone()
    }

    /// Block until the scheduler is idle with nothing pending. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.phase != RestartPhase::Idle {
            if self.shared.cond.wait_until(&mut state, deadline).timed_out() {
                return state.phase == RestartPhase::Idle;
            }
        }
        true
    }

    /// Drop pending changes and stop the worker thread.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.pending.clear();
            state.deadline = None;
            self.shared.cond.notify_all();
        }
        if let Some(handle) = self.handle.lock().take() {
            // the last session reference can be released inside the callback
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for RestartScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: Arc<SchedulerShared>) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            state.phase = RestartPhase::Idle;
            shared.cond.notify_all();
            break;
        }

        let Some(deadline) = state.deadline else {
            shared.cond.wait(&mut state);
            continue;
        };

        if Instant::now() < deadline {
            shared.cond.wait_until(&mut state, deadline);
            continue;
        }

        let changes = mem::take(&mut state.pending);
        state.deadline = None;
        state.phase = RestartPhase::Restarting;
        shared.cond.notify_all();

        log::info!("Restarting capture for {} setting change(s)", changes.len());
        let callback = Arc::clone(&shared.callback);
        MutexGuard::unlocked(&mut state, || callback(changes));

        state.phase = if state.deadline.is_some() {
            RestartPhase::PendingSettle
        } else {
            RestartPhase::Idle
        };
        shared.cond.notify_all();
    }
}
