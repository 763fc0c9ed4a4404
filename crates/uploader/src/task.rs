//! Upload task state machine.
//!
//! An [`UploadTask`] owns one file's lifecycle:
//!
//! ```text
//! Idle -> Hashing -> Reconciling -> Initializing -> Transferring <-> Paused
//!                         |                              |
//!                         +--(instant)--> Completed <- Finalizing
//! ```
//!
//! `Failed` and `Cancelled` are reachable from every running state.
//! Control operations (`pause`, `cancel`, `reset`) flip the state and the
//! pass token under one lock, then wait for the running pass to drain
//! before they return.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use shardlift_protocol::{CancelRequest, CompleteRequest, TaskState};
use shardlift_transfer::{
    Chunk, ChunkSource, SpeedTracker, TransferError, UploadSession, hash_file, plan_chunks,
    validate_file_name, validate_upload,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::UploadBackend;
use crate::config::EngineConfig;
use crate::error::UploadError;
use crate::reconciler::{Decision, SessionReconciler};
use crate::scheduler::{PassOutcome, TransferScheduler};
use crate::state::{SharedInner, TaskInner, lock};
use crate::transporter::ChunkTransporter;
use crate::types::{EventSink, SelectedFile, UploadEvent, UploadSnapshot};

/// Capacity of the event channel.
const EVENT_CAPACITY: usize = 256;

/// Resumable upload of one file to an [`UploadBackend`].
pub struct UploadTask {
    backend: Arc<dyn UploadBackend>,
    config: Arc<EngineConfig>,
    inner: SharedInner,
    events: EventSink,
    events_rx: Mutex<Option<mpsc::Receiver<UploadEvent>>>,
    /// Held by whichever operation is driving the pipeline.
    run_lock: tokio::sync::Mutex<()>,
}

impl UploadTask {
    /// Creates an idle task.
    pub fn new(backend: Arc<dyn UploadBackend>, config: EngineConfig) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        Self {
            backend,
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(TaskInner::new())),
            events: EventSink::new(tx),
            events_rx: Mutex::new(Some(rx)),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }

    pub fn state(&self) -> TaskState {
        lock(&self.inner).state
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        lock(&self.inner).snapshot(Instant::now())
    }

    /// Copy of the chunk list.
    pub fn chunks(&self) -> Vec<Chunk> {
        lock(&self.inner).chunks.clone()
    }

    pub fn session(&self) -> Option<UploadSession> {
        lock(&self.inner).session.clone()
    }

    /// Backend part tags by chunk index, for chunks sent by this task.
    pub fn part_tags(&self) -> Vec<(u32, String)> {
        lock(&self.inner)
            .chunks
            .iter()
            .filter_map(|c| c.part_tag.clone().map(|tag| (c.index, tag)))
            .collect()
    }

    /// Selects the file to upload and plans its chunks.
    ///
    /// Only valid while idle; replaces any previous selection.
    pub async fn select_file(&self, path: impl AsRef<Path>) -> Result<(), UploadError> {
        let path = path.as_ref();
        let state = self.state();
        if state != TaskState::Idle {
            return Err(UploadError::InvalidState {
                operation: "select a file",
                state,
            });
        }

        let meta = tokio::fs::metadata(path).await.map_err(TransferError::Io)?;
        if !meta.is_file() {
            return Err(UploadError::Validation(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        validate_file_name(&name)?;
        let total = validate_upload(meta.len(), self.config.chunk_size, &self.config.limits())?;

        let mut inner = lock(&self.inner);
        if inner.state != TaskState::Idle {
            return Err(UploadError::InvalidState {
                operation: "select a file",
                state: inner.state,
            });
        }
        *inner = TaskInner::new();
        inner.chunks = plan_chunks(meta.len(), self.config.chunk_size);
        inner.speed = SpeedTracker::new(meta.len());
        inner.file = Some(SelectedFile {
            path: path.to_path_buf(),
            name: name.clone(),
            size: meta.len(),
        });
        info!(file = %name, size = meta.len(), chunks = total, "file selected");
        Ok(())
    }

    /// Runs the upload from the selected file to completion.
    ///
    /// Returns the state the run stopped in: `Completed`, or `Paused` /
    /// `Cancelled` / `Idle` when another operation interrupted it.
    pub async fn start(&self) -> Result<TaskState, UploadError> {
        let _run = self.run_lock.lock().await;
        let cancel = {
            let mut inner = lock(&self.inner);
            if inner.state != TaskState::Idle {
                return Err(UploadError::InvalidState {
                    operation: "start",
                    state: inner.state,
                });
            }
            if inner.file.is_none() {
                return Err(UploadError::Validation("no file selected".into()));
            }
            inner.cancel = CancellationToken::new();
            inner.cancel.clone()
        };
        self.execute(&cancel, false).await
    }

    /// Stops the transfer phase. In-flight chunks are cancelled and their
    /// partial progress dropped before this returns.
    pub async fn pause(&self) -> Result<(), UploadError> {
        {
            let mut inner = lock(&self.inner);
            if inner.state != TaskState::Transferring {
                return Err(UploadError::InvalidState {
                    operation: "pause",
                    state: inner.state,
                });
            }
            inner.state = TaskState::Paused;
            inner.cancel.cancel();
        }
        self.events.state(TaskState::Paused);

        let _run = self.run_lock.lock().await;
        let mut inner = lock(&self.inner);
        inner.reset_partial();
        inner.speed.suspend_at(Instant::now());
        info!(uploaded = inner.uploaded_bytes(), "upload paused");
        Ok(())
    }

    /// Continues a paused upload with every chunk not yet acknowledged.
    pub async fn resume(&self) -> Result<TaskState, UploadError> {
        let _run = self.run_lock.lock().await;
        let cancel = {
            let mut inner = lock(&self.inner);
            if inner.state != TaskState::Paused {
                return Err(UploadError::InvalidState {
                    operation: "resume",
                    state: inner.state,
                });
            }
            inner.cancel = CancellationToken::new();
            inner.cancel.clone()
        };
        info!("upload resumed");
        self.execute(&cancel, true).await
    }

    /// Aborts the upload and tears down the remote session, if any.
    ///
    /// Remote teardown is best-effort: its failure is logged and the task
    /// still ends `Cancelled`.
    pub async fn cancel(&self) -> Result<(), UploadError> {
        let interrupted = {
            let mut inner = lock(&self.inner);
            let state = inner.state;
            // Finalizing is excluded: the object may already be merged.
            if state == TaskState::Finalizing
                || !(state.is_running() || state == TaskState::Paused)
            {
                return Err(UploadError::InvalidState {
                    operation: "cancel",
                    state,
                });
            }
            inner.state = TaskState::Cancelled;
            inner.cancel.cancel();
            state
        };
        self.events.state(TaskState::Cancelled);

        // The backend may have opened a session for a check or initialize
        // request that was still in flight, so decide after the pass drained.
        let _run = self.run_lock.lock().await;
        let fingerprint = {
            let mut inner = lock(&self.inner);
            inner.reset_partial();
            inner.speed.suspend_at(Instant::now());
            let contacted = inner.session.is_some()
                || matches!(
                    interrupted,
                    TaskState::Reconciling | TaskState::Initializing
                );
            inner.fingerprint.clone().filter(|_| contacted)
        };

        if let Some(fingerprint) = fingerprint {
            if let Err(e) = self.backend.cancel(&CancelRequest { fingerprint }).await {
                warn!(error = %e, "remote session teardown failed");
            }
        }
        info!(from = %interrupted, "upload cancelled");
        Ok(())
    }

    /// Retries a failed upload from the furthest phase it reached.
    ///
    /// Acknowledged chunks are kept; only pending chunks are sent again.
    pub async fn retry(&self) -> Result<TaskState, UploadError> {
        let _run = self.run_lock.lock().await;
        let cancel = {
            let mut inner = lock(&self.inner);
            if inner.state != TaskState::Failed {
                return Err(UploadError::InvalidState {
                    operation: "retry",
                    state: inner.state,
                });
            }
            inner.last_error = None;
            inner.cancel = CancellationToken::new();
            inner.cancel.clone()
        };
        info!("retrying upload");
        self.execute(&cancel, false).await
    }

    /// Returns the task to `Idle`, discarding the file and all progress.
    /// Valid in every state; a running pass is stopped first.
    pub async fn reset(&self) {
        {
            let mut inner = lock(&self.inner);
            inner.state = TaskState::Idle;
            inner.cancel.cancel();
        }
        let _run = self.run_lock.lock().await;
        *lock(&self.inner) = TaskInner::new();
        self.events.state(TaskState::Idle);
        info!("upload task reset");
    }

    /// Runs the pipeline and records a failure if it did not get
    /// interrupted first.
    async fn execute(&self, cancel: &CancellationToken, resumed: bool) -> Result<TaskState, UploadError> {
        let err = match self.drive(cancel, resumed).await {
            Ok(state) => return Ok(state),
            Err(e) => e,
        };

        let message = err.to_string();
        {
            let mut inner = lock(&self.inner);
            if cancel.is_cancelled() {
                debug!(error = %message, state = %inner.state, "error after interruption ignored");
                return Ok(inner.state);
            }
            inner.state = TaskState::Failed;
            inner.last_error = Some(message.clone());
            inner.reset_partial();
            inner.speed.suspend_at(Instant::now());
        }
        error!(error = %message, "upload failed");
        self.events.state(TaskState::Failed);
        self.events.emit(UploadEvent::Failed { error: message });
        Err(err)
    }

    /// Hash, reconcile, transfer and finalize, skipping phases whose
    /// results are already known.
    async fn drive(&self, cancel: &CancellationToken, resumed: bool) -> Result<TaskState, UploadError> {
        let (file, fingerprint, has_session, total_chunks) = {
            let inner = lock(&self.inner);
            let file = inner
                .file
                .clone()
                .ok_or_else(|| UploadError::Validation("no file selected".into()))?;
            (
                file,
                inner.fingerprint.clone(),
                inner.session.is_some(),
                inner.chunks.len() as u32,
            )
        };

        let fingerprint = match fingerprint {
            Some(fp) => fp,
            None => {
                if !self.advance(cancel, TaskState::Hashing) {
                    return Ok(self.state());
                }
                let events = self.events.clone();
                let hashed = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(self.state()),
                    hashed = hash_file(&file.path, self.config.hash_window, |p| {
                        events.emit(UploadEvent::HashProgress {
                            bytes_processed: p.bytes_processed,
                            percent: p.percent,
                        });
                    }) => hashed?,
                };
                info!(fingerprint = %hashed, "file fingerprinted");
                lock(&self.inner).fingerprint = Some(hashed.clone());
                hashed
            }
        };

        if !has_session {
            if !self.advance(cancel, TaskState::Reconciling) {
                return Ok(self.state());
            }
            let reconciler = SessionReconciler::new(self.backend.as_ref());
            let decision = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(self.state()),
                decision = reconciler.check_status(&fingerprint, &file.name, file.size, total_chunks) => decision?,
            };

            match decision {
                Decision::Instant { url } => {
                    info!(fingerprint = %fingerprint, "backend already holds the object");
                    return Ok(self.finish(cancel, url, true));
                }
                Decision::Resume { info, satisfied } => {
                    let mut inner = lock(&self.inner);
                    let matched = satisfied.apply(&fingerprint, &mut inner.chunks);
                    info!(
                        session = %info.session_id,
                        satisfied = matched.len(),
                        total_chunks,
                        "resuming existing session"
                    );
                    inner.session = Some(UploadSession::from_info(
                        info, &file.name, file.size, matched,
                    ));
                }
                Decision::Fresh => {
                    if !self.advance(cancel, TaskState::Initializing) {
                        return Ok(self.state());
                    }
                    let session = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(self.state()),
                        session = reconciler.initialize_session(
                            &fingerprint,
                            &file.name,
                            file.size,
                            self.config.chunk_size,
                            total_chunks,
                        ) => session?,
                    };
                    info!(session = %session.session_id, "session initialized");
                    lock(&self.inner).session = Some(session);
                }
            }
        }

        if !self.advance(cancel, TaskState::Transferring) {
            return Ok(self.state());
        }
        {
            let mut inner = lock(&self.inner);
            let uploaded = inner.uploaded_bytes();
            if resumed {
                inner.speed.resume_at(uploaded, Instant::now());
            } else {
                inner.speed.start_at(uploaded, Instant::now());
            }
        }

        let scheduler = TransferScheduler::new(
            ChunkTransporter::new(Arc::clone(&self.backend), self.config.chunk_timeout()),
            ChunkSource::new(&file.path),
            Arc::clone(&self.inner),
            self.events.clone(),
            Arc::clone(&self.config),
            &file.name,
            &fingerprint,
        );
        match scheduler.run(cancel).await? {
            PassOutcome::Completed => {}
            PassOutcome::Interrupted if cancel.is_cancelled() => return Ok(self.state()),
            PassOutcome::Interrupted => {
                return Err(UploadError::Internal(
                    "transfer pass stopped with chunks pending".into(),
                ));
            }
        }

        if !self.advance(cancel, TaskState::Finalizing) {
            return Ok(self.state());
        }
        let req = CompleteRequest {
            fingerprint: fingerprint.clone(),
        };
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(self.state()),
            resp = self.backend.complete(&req) => {
                resp.map_err(|e| UploadError::Finalize(e.to_string()))?
            }
        };
        if !resp.success {
            let reason = resp.message.unwrap_or_else(|| "backend refused to merge".into());
            return Err(UploadError::Finalize(reason));
        }
        Ok(self.finish(cancel, resp.url, false))
    }

    /// Moves to `to` unless the pass was interrupted.
    fn advance(&self, cancel: &CancellationToken, to: TaskState) -> bool {
        {
            let mut inner = lock(&self.inner);
            if cancel.is_cancelled() {
                return false;
            }
            inner.state = to;
        }
        info!(state = %to, "upload state changed");
        self.events.state(to);
        true
    }

    fn finish(&self, cancel: &CancellationToken, url: Option<String>, instant: bool) -> TaskState {
        {
            let mut inner = lock(&self.inner);
            if cancel.is_cancelled() {
                return inner.state;
            }
            if instant {
                for chunk in &mut inner.chunks {
                    chunk.mark_satisfied();
                }
            }
            inner.url = url.clone();
            inner.state = TaskState::Completed;
            inner.speed.suspend_at(Instant::now());
        }
        info!(url = url.as_deref().unwrap_or("-"), instant, "upload completed");
        self.events.state(TaskState::Completed);
        self.events.emit(UploadEvent::Completed { url, instant });
        TaskState::Completed
    }
}
