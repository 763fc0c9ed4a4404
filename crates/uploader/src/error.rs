//! Upload error types.

use shardlift_protocol::TaskState;
use shardlift_transfer::TransferError;

/// Errors surfaced by a backend call.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid backend configuration: {0}")]
    Config(String),
}

/// Outcome of a failed single-chunk transfer.
///
/// Cancellation is kept apart from the retryable variants so a pause is
/// never counted against the retry budget.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("chunk transfer cancelled")]
    Cancelled,

    #[error("chunk transfer timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),
}

impl TransportError {
    /// Returns `true` for failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// Fatal errors of an upload task.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("read failed: {0}")]
    Read(#[source] TransferError),

    #[error("reconciliation failed: {0}")]
    Reconciliation(String),

    #[error("chunk {index} failed after {attempts} attempts: {source}")]
    TransferFailed {
        index: u32,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("finalize failed: {0}")]
    Finalize(String),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: TaskState,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TransferError> for UploadError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Validation(msg) => Self::Validation(msg),
            TransferError::InvalidName(msg) => Self::Validation(format!("invalid file name: {msg}")),
            other => Self::Read(other),
        }
    }
}
