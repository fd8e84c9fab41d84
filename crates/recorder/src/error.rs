//! Error types for the recorder.

use thiserror::Error;

/// Result type alias for recorder operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while recording or generating code.
#[derive(Debug, Error)]
pub enum Error {
    /// Requested primary language has no registered generator.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Performing a recorded action against the live frame timed out.
    #[error("timeout after {ms}ms performing {action}")]
    ActionTimeout { action: String, ms: u64 },

    /// Failure from the server runtime (perform step, dispatch).
    #[error(transparent)]
    Server(#[from] drover_server::Error),

    /// JSON serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// I/O error writing generated output.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::ActionTimeout { .. } => true,
            Error::Server(e) => e.is_timeout(),
            _ => false,
        }
    }
}
