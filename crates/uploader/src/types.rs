use std::path::PathBuf;

use shardlift_protocol::TaskState;
use shardlift_transfer::SpeedSnapshot;
use tokio::sync::mpsc;
use tracing::trace;

/// Progress events emitted by an upload task.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    StateChanged {
        state: TaskState,
    },
    HashProgress {
        bytes_processed: u64,
        percent: f64,
    },
    ChunkProgress {
        index: u32,
        percent: f64,
    },
    ChunkUploaded {
        index: u32,
        /// Bytes per second of the successful attempt.
        throughput: Option<f64>,
    },
    ChunkRetry {
        index: u32,
        attempt: u32,
        error: String,
    },
    Speed(SpeedSnapshot),
    Completed {
        url: Option<String>,
        /// The backend already held the full object.
        instant: bool,
    },
    Failed {
        error: String,
    },
}

/// The file an upload task was created for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

/// Point-in-time view of an upload task.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSnapshot {
    pub state: TaskState,
    pub file: Option<SelectedFile>,
    pub fingerprint: Option<String>,
    pub total_chunks: u32,
    pub uploaded_chunks: u32,
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
    pub percent: f64,
    pub speed: SpeedSnapshot,
    pub url: Option<String>,
    pub last_error: Option<String>,
}

impl UploadSnapshot {
    pub(crate) fn percent_of(uploaded: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            (uploaded.min(total) as f64 / total as f64) * 100.0
        }
    }
}

/// Non-blocking event publisher.
///
/// Progress is lossy by nature: when the consumer lags or has dropped the
/// receiver, events are discarded instead of stalling transfers.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: mpsc::Sender<UploadEvent>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::Sender<UploadEvent>) -> Self {
        Self { tx }
    }

    pub(crate) fn emit(&self, event: UploadEvent) {
        if let Err(e) = self.tx.try_send(event) {
            trace!(error = %e, "upload event dropped");
        }
    }

    pub(crate) fn state(&self, state: TaskState) {
        self.emit(UploadEvent::StateChanged { state });
    }
}
