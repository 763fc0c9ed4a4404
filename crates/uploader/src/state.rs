//! Mutable state shared by a task and its scheduler pass.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use shardlift_protocol::TaskState;
use shardlift_transfer::{Chunk, SpeedTracker, UploadSession};
use tokio_util::sync::CancellationToken;

use crate::types::{SelectedFile, UploadSnapshot};

pub(crate) type SharedInner = Arc<Mutex<TaskInner>>;

/// Everything an upload task knows about its file and its progress.
#[derive(Debug)]
pub(crate) struct TaskInner {
    pub state: TaskState,
    pub file: Option<SelectedFile>,
    pub fingerprint: Option<String>,
    pub chunks: Vec<Chunk>,
    pub session: Option<UploadSession>,
    pub speed: SpeedTracker,
    pub url: Option<String>,
    pub last_error: Option<String>,
    /// Token of the running pass. Cancelled together with the state
    /// change that stops it, under the same lock.
    pub cancel: CancellationToken,
}

impl TaskInner {
    pub(crate) fn new() -> Self {
        Self {
            state: TaskState::Idle,
            file: None,
            fingerprint: None,
            chunks: Vec::new(),
            session: None,
            speed: SpeedTracker::new(0),
            url: None,
            last_error: None,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn total_bytes(&self) -> u64 {
        self.file.as_ref().map_or(0, |f| f.size)
    }

    /// Acknowledged bytes plus bytes in flight for unfinished chunks.
    pub(crate) fn uploaded_bytes(&self) -> u64 {
        self.chunks.iter().map(Chunk::uploaded_bytes).sum()
    }

    pub(crate) fn pending(&self) -> Vec<u32> {
        self.chunks
            .iter()
            .filter(|c| !c.uploaded)
            .map(|c| c.index)
            .collect()
    }

    pub(crate) fn all_uploaded(&self) -> bool {
        self.chunks.iter().all(|c| c.uploaded)
    }

    /// Drops in-flight progress so an interrupted chunk restarts from its
    /// first byte.
    pub(crate) fn reset_partial(&mut self) {
        for chunk in &mut self.chunks {
            chunk.reset_progress();
        }
    }

    pub(crate) fn snapshot(&self, now: Instant) -> UploadSnapshot {
        let uploaded_bytes = self.uploaded_bytes();
        let total_bytes = self.total_bytes();
        UploadSnapshot {
            state: self.state,
            file: self.file.clone(),
            fingerprint: self.fingerprint.clone(),
            total_chunks: self.chunks.len() as u32,
            uploaded_chunks: self.chunks.iter().filter(|c| c.uploaded).count() as u32,
            uploaded_bytes,
            total_bytes,
            percent: UploadSnapshot::percent_of(uploaded_bytes, total_bytes),
            speed: self.speed.snapshot_at(now),
            url: self.url.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Locks the shared state. A panicked holder leaves plain data behind,
/// so poisoning is ignored.
pub(crate) fn lock(inner: &Mutex<TaskInner>) -> MutexGuard<'_, TaskInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
