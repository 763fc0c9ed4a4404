//! Bounded-concurrency transfer pass.
//!
//! One pass admits every pending chunk through a pool of at most
//! `concurrency` jobs. Each admitted chunk owns a child cancellation token
//! registered in the in-flight map, so a chunk index is never sent by two
//! jobs at once. The pass ends when the queue is drained, when the task
//! cancels the parent token (pause/cancel), or after the first fatal
//! chunk failure, which cancels the remaining jobs.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use shardlift_protocol::ChunkFields;
use shardlift_transfer::{ChunkSource, checksum_bytes};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::backend::ProgressFn;
use crate::config::EngineConfig;
use crate::error::{TransportError, UploadError};
use crate::state::{SharedInner, lock};
use crate::transporter::ChunkTransporter;
use crate::types::{EventSink, UploadEvent};

/// How a transfer pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassOutcome {
    /// Every chunk is acknowledged.
    Completed,
    /// Stopped by pause or cancel; pending chunks remain.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkOutcome {
    Uploaded,
    Interrupted,
}

/// Drives the chunk transporter over all pending chunks.
pub(crate) struct TransferScheduler {
    job: ChunkJob,
    concurrency: usize,
}

/// Everything one spawned chunk job needs. Cheap to clone.
#[derive(Clone)]
struct ChunkJob {
    transporter: ChunkTransporter,
    source: Arc<ChunkSource>,
    inner: SharedInner,
    events: EventSink,
    config: Arc<EngineConfig>,
    file_name: Arc<str>,
    fingerprint: Arc<str>,
}

impl TransferScheduler {
    pub(crate) fn new(
        transporter: ChunkTransporter,
        source: ChunkSource,
        inner: SharedInner,
        events: EventSink,
        config: Arc<EngineConfig>,
        file_name: &str,
        fingerprint: &str,
    ) -> Self {
        let concurrency = config.effective_concurrency();
        Self {
            job: ChunkJob {
                transporter,
                source: Arc::new(source),
                inner,
                events,
                config,
                file_name: Arc::from(file_name),
                fingerprint: Arc::from(fingerprint),
            },
            concurrency,
        }
    }

    /// Runs one pass. Partial progress of interrupted chunks is dropped
    /// before returning, so nothing is left half-sent.
    pub(crate) async fn run(&self, cancel: &CancellationToken) -> Result<PassOutcome, UploadError> {
        let mut queue: VecDeque<u32> = lock(&self.job.inner).pending().into();
        let mut jobs: JoinSet<(u32, Result<ChunkOutcome, UploadError>)> = JoinSet::new();
        let mut in_flight: HashMap<u32, CancellationToken> = HashMap::new();
        let mut failure: Option<UploadError> = None;

        debug!(
            pending = queue.len(),
            concurrency = self.concurrency,
            "transfer pass started"
        );

        loop {
            while failure.is_none() && !cancel.is_cancelled() && in_flight.len() < self.concurrency
            {
                let Some(index) = queue.pop_front() else {
                    break;
                };
                if in_flight.contains_key(&index) {
                    continue;
                }
                let token = cancel.child_token();
                in_flight.insert(index, token.clone());
                let job = self.job.clone();
                jobs.spawn(async move { (index, job.run(index, token).await) });
            }

            let Some(joined) = jobs.join_next().await else {
                break;
            };
            let outcome = match joined {
                Ok((index, result)) => {
                    in_flight.remove(&index);
                    result
                }
                Err(e) => Err(UploadError::Internal(format!("chunk job aborted: {e}"))),
            };

            if let Err(e) = outcome {
                if failure.is_none() {
                    error!(error = %e, "transfer pass failed, stopping in-flight chunks");
                    for token in in_flight.values() {
                        token.cancel();
                    }
                    failure = Some(e);
                }
            }
        }

        let all_uploaded = {
            let mut inner = lock(&self.job.inner);
            inner.reset_partial();
            inner.all_uploaded()
        };

        if let Some(e) = failure {
            return Err(e);
        }
        if all_uploaded {
            Ok(PassOutcome::Completed)
        } else {
            Ok(PassOutcome::Interrupted)
        }
    }
}

impl ChunkJob {
    /// Sends one chunk, retrying retryable failures with linear backoff.
    async fn run(self, index: u32, cancel: CancellationToken) -> Result<ChunkOutcome, UploadError> {
        let slot = index as usize;
        let chunk = lock(&self.inner)
            .chunks
            .get(slot)
            .cloned()
            .ok_or_else(|| UploadError::Internal(format!("chunk {index} is not planned")))?;

        let data = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(ChunkOutcome::Interrupted),
            read = self.source.read(&chunk) => read?,
        };

        let chunk_fingerprint = match (self.config.chunk_fingerprints, chunk.fingerprint) {
            (false, _) => String::new(),
            (true, Some(fp)) => fp,
            (true, None) => {
                let fp = checksum_bytes(&data);
                if let Some(c) = lock(&self.inner).chunks.get_mut(slot) {
                    c.fingerprint = Some(fp.clone());
                }
                fp
            }
        };

        let fields = ChunkFields {
            file_name: self.file_name.to_string(),
            fingerprint: self.fingerprint.to_string(),
            chunk_index: index,
            chunk_fingerprint,
        };

        let attempts = self.config.effective_retry_times();
        let mut attempt = 0;
        loop {
            attempt += 1;
            if let Some(c) = lock(&self.inner).chunks.get_mut(slot) {
                c.begin_attempt(Instant::now());
            }
            debug!(chunk = index, attempt, bytes = data.len(), "sending chunk");

            let progress = self.progress_fn(index, cancel.clone());
            let err = match self
                .transporter
                .send(&fields, data.clone(), &cancel, progress)
                .await
            {
                Ok(receipt) => {
                    self.on_uploaded(index, receipt.part_tag);
                    return Ok(ChunkOutcome::Uploaded);
                }
                Err(TransportError::Cancelled) => {
                    if let Some(c) = lock(&self.inner).chunks.get_mut(slot) {
                        c.reset_progress();
                    }
                    debug!(chunk = index, "chunk interrupted");
                    return Ok(ChunkOutcome::Interrupted);
                }
                Err(e) => e,
            };

            if let Some(c) = lock(&self.inner).chunks.get_mut(slot) {
                c.retry_count += 1;
                c.reset_progress();
            }

            if attempt >= attempts {
                return Err(UploadError::TransferFailed {
                    index,
                    attempts,
                    source: err,
                });
            }

            warn!(chunk = index, attempt, error = %err, "chunk attempt failed, retrying");
            self.events.emit(UploadEvent::ChunkRetry {
                index,
                attempt,
                error: err.to_string(),
            });

            let delay = self.config.backoff_delay(attempt);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(ChunkOutcome::Interrupted),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Progress callback for one attempt. Updates after cancellation are
    /// ignored so a pause cannot resurrect partial progress.
    fn progress_fn(&self, index: u32, cancel: CancellationToken) -> ProgressFn {
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        Arc::new(move |sent| {
            if cancel.is_cancelled() {
                return;
            }
            let (percent, speed) = {
                let mut inner = lock(&inner);
                let Some(chunk) = inner.chunks.get_mut(index as usize) else {
                    return;
                };
                if chunk.uploaded {
                    return;
                }
                chunk.bytes_sent = sent.min(chunk.len());
                let percent = chunk.progress_percent();
                let uploaded = inner.uploaded_bytes();
                let speed = inner
                    .speed
                    .record(uploaded)
                    .then(|| inner.speed.snapshot());
                (percent, speed)
            };
            events.emit(UploadEvent::ChunkProgress { index, percent });
            if let Some(speed) = speed {
                events.emit(UploadEvent::Speed(speed));
            }
        })
    }

    fn on_uploaded(&self, index: u32, part_tag: Option<String>) {
        let throughput = {
            let mut inner = lock(&self.inner);
            let Some(chunk) = inner.chunks.get_mut(index as usize) else {
                return;
            };
            chunk.mark_uploaded(part_tag, Instant::now());
            let throughput = chunk.throughput();
            let uploaded = inner.uploaded_bytes();
            inner.speed.record(uploaded);
            throughput
        };
        debug!(chunk = index, throughput = ?throughput, "chunk uploaded");
        self.events.emit(UploadEvent::ChunkProgress {
            index,
            percent: 100.0,
        });
        self.events
            .emit(UploadEvent::ChunkUploaded { index, throughput });
    }
}
