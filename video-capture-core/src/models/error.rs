use thiserror::Error;

/// Errors that can occur while capturing, encoding or finalizing video.
///
/// Session-level failures (initialize, finalize, mux) are surfaced to the
/// caller through `SessionDelegate::on_recording_failed` and as `Err` returns.
/// Per-frame failures never leave the frame pump; they are logged and counted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("encoder initialization failed: {0}")]
    InitializationFailed(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("finalization failed: {0}")]
    FinalizationFailed(String),

    #[error("mux failed: {0}")]
    MuxFailed(String),

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("no active encoder")]
    NoActiveEncoder,

    #[error("timeout")]
    Timeout,

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CaptureError {
    /// Maps an I/O failure into a storage error with a short context prefix.
    pub fn storage(context: &str, err: std::io::Error) -> Self {
        Self::StorageError(format!("{}: {}", context, err))
    }
}
