use serde::{Deserialize, Serialize};

/// Recording session state machine.
///
/// State transitions:
/// ```text
///          start (pre-roll on)          start (commit)
/// idle ───────────────────────→ pre_roll ──────────────→ live
///   │                              │                      │
///   └──── start (pre-roll off) ────┼──────────────────────┘
///                                  ↓                      ↓
///                               stopping ───────────→ idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    PreRoll,
    Live,
    Stopping,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether an encoder is (or should be) receiving frames.
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::PreRoll | Self::Live)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PreRoll => "pre_roll",
            Self::Live => "live",
            Self::Stopping => "stopping",
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Which segment an encoder instance is producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// Disposable buffer encoded before the user commits.
    PreRoll,
    /// Committed, file-backed recording.
    Live,
}

/// Result of a `RecordingSession::start_recording` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Idle → PreRoll: encoder buffering against the pre-roll target.
    PreRollStarted,
    /// Idle → Live.
    LiveStarted,
    /// PreRoll → Live: pre-roll segment finalized and live encoder started.
    Promoted,
    /// Rejected because another transition was in progress or the session is
    /// already live.
    Ignored,
}
