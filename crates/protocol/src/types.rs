use serde::{Deserialize, Serialize};

/// Lifecycle state of an upload task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "hashing")]
    Hashing,
    #[serde(rename = "reconciling")]
    Reconciling,
    #[serde(rename = "initializing")]
    Initializing,
    #[serde(rename = "transferring")]
    Transferring,
    #[serde(rename = "paused")]
    Paused,
    #[serde(rename = "finalizing")]
    Finalizing,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl TaskState {
    /// Returns `true` once the task has stopped for good. Only `reset`
    /// (and `retry` from `Failed`) leave a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` while network or hashing work may be in flight.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            Self::Hashing
                | Self::Reconciling
                | Self::Initializing
                | Self::Transferring
                | Self::Finalizing
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Hashing => "hashing",
            Self::Reconciling => "reconciling",
            Self::Initializing => "initializing",
            Self::Transferring => "transferring",
            Self::Paused => "paused",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Prior progress the backend reports for a fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeMeta {
    #[serde(default)]
    pub uploaded_count: u32,
    #[serde(default)]
    pub total_chunks: u32,
    #[serde(default)]
    pub progress_percent: f64,
}

/// Server-side bookkeeping for an in-progress multi-chunk upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub remote_upload_id: String,
    pub object_name: String,
    pub total_chunks: u32,
}
