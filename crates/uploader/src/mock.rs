//! Scripted in-memory backend for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use shardlift_protocol::{
    CancelRequest, CheckRequest, CheckResponse, ChunkFields, ChunkResponse, CompleteRequest,
    CompleteResponse, InitRequest, InitResponse, SessionInfo,
};
use tokio::sync::Notify;

use crate::backend::{BackendFuture, ProgressFn, UploadBackend};
use crate::error::BackendError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Check,
    Initialize,
    Chunk(u32),
    Complete,
    Cancel,
}

/// Records every call and lets tests inject failures per chunk index.
pub(crate) struct MockBackend {
    check_response: Mutex<CheckResponse>,
    fail_check: AtomicBool,
    fail_initialize: AtomicBool,
    fail_complete: AtomicBool,
    fail_cancel: AtomicBool,
    hang_initialize: AtomicBool,
    calls: Mutex<Vec<Call>>,
    rejects: Mutex<HashMap<u32, u32>>,
    hangs: Mutex<HashMap<u32, u32>>,
    chunk_delay: Mutex<Duration>,
    received: Mutex<Vec<(u32, usize)>>,
    chunk_fingerprints: Mutex<HashMap<u32, String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    hang_started: Notify,
}

/// Tracks one in-flight chunk call; released on drop so cancelled
/// futures are accounted for too.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self {
            check_response: Mutex::new(CheckResponse::default()),
            fail_check: AtomicBool::new(false),
            fail_initialize: AtomicBool::new(false),
            fail_complete: AtomicBool::new(false),
            fail_cancel: AtomicBool::new(false),
            hang_initialize: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            rejects: Mutex::new(HashMap::new()),
            hangs: Mutex::new(HashMap::new()),
            chunk_delay: Mutex::new(Duration::ZERO),
            received: Mutex::new(Vec::new()),
            chunk_fingerprints: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            hang_started: Notify::new(),
        }
    }

    pub(crate) fn set_check_response(&self, resp: CheckResponse) {
        *self.check_response.lock().unwrap() = resp;
    }

    pub(crate) fn fail_check(&self) {
        self.fail_check.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_initialize(&self) {
        self.fail_initialize.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_complete(&self, fail: bool) {
        self.fail_complete.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_cancel(&self) {
        self.fail_cancel.store(true, Ordering::SeqCst);
    }

    /// Initialize requests are recorded and then never answered.
    pub(crate) fn hang_initialize(&self) {
        self.hang_initialize.store(true, Ordering::SeqCst);
    }

    /// The next `times` attempts of chunk `index` are rejected.
    pub(crate) fn reject_chunk(&self, index: u32, times: u32) {
        self.rejects.lock().unwrap().insert(index, times);
    }

    /// The next `times` attempts of chunk `index` report half the bytes
    /// and then never finish.
    pub(crate) fn hang_chunk(&self, index: u32, times: u32) {
        self.hangs.lock().unwrap().insert(index, times);
    }

    pub(crate) fn set_chunk_delay(&self, delay: Duration) {
        *self.chunk_delay.lock().unwrap() = delay;
    }

    /// Waits until some call starts hanging.
    pub(crate) async fn wait_for_hang(&self) {
        self.hang_started.notified().await;
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, call: &Call) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub(crate) fn chunk_attempts(&self, index: u32) -> usize {
        self.count(&Call::Chunk(index))
    }

    pub(crate) fn chunk_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::Chunk(_)))
            .count()
    }

    /// Successfully received chunks as `(index, byte length)`.
    pub(crate) fn received(&self) -> Vec<(u32, usize)> {
        self.received.lock().unwrap().clone()
    }

    pub(crate) fn chunk_fingerprint(&self, index: u32) -> Option<String> {
        self.chunk_fingerprints.lock().unwrap().get(&index).cloned()
    }

    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub(crate) fn active_chunks(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn take_one(map: &Mutex<HashMap<u32, u32>>, index: u32) -> bool {
        let mut map = map.lock().unwrap();
        match map.get_mut(&index) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

impl UploadBackend for MockBackend {
    fn check(&self, _req: &CheckRequest) -> BackendFuture<'_, CheckResponse> {
        self.record(Call::Check);
        Box::pin(async move {
            if self.fail_check.load(Ordering::SeqCst) {
                return Err(BackendError::Api {
                    status: 500,
                    body: "check unavailable".into(),
                });
            }
            Ok(self.check_response.lock().unwrap().clone())
        })
    }

    fn initialize(&self, req: &InitRequest) -> BackendFuture<'_, InitResponse> {
        self.record(Call::Initialize);
        let req = req.clone();
        Box::pin(async move {
            if self.hang_initialize.load(Ordering::SeqCst) {
                self.hang_started.notify_one();
                std::future::pending::<()>().await;
            }
            if self.fail_initialize.load(Ordering::SeqCst) {
                return Ok(InitResponse {
                    success: false,
                    session: None,
                    message: Some("quota exceeded".into()),
                });
            }
            Ok(InitResponse {
                success: true,
                session: Some(SessionInfo {
                    session_id: format!("session-{}", req.fingerprint),
                    remote_upload_id: "remote-1".into(),
                    object_name: format!("objects/{}", req.file_name),
                    total_chunks: req.total_chunks,
                }),
                message: None,
            })
        })
    }

    fn upload_chunk(
        &self,
        fields: &ChunkFields,
        data: Vec<u8>,
        progress: ProgressFn,
    ) -> BackendFuture<'_, ChunkResponse> {
        let index = fields.chunk_index;
        self.record(Call::Chunk(index));
        if !fields.chunk_fingerprint.is_empty() {
            self.chunk_fingerprints
                .lock()
                .unwrap()
                .insert(index, fields.chunk_fingerprint.clone());
        }
        Box::pin(async move {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            let _guard = ActiveGuard(&self.active);

            let len = data.len();
            progress((len / 2) as u64);

            if Self::take_one(&self.hangs, index) {
                self.hang_started.notify_one();
                std::future::pending::<()>().await;
            }

            let delay = *self.chunk_delay.lock().unwrap();
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }

            if Self::take_one(&self.rejects, index) {
                return Ok(ChunkResponse {
                    success: false,
                    part_tag: None,
                    message: Some("injected failure".into()),
                });
            }

            progress(len as u64);
            self.received.lock().unwrap().push((index, len));
            Ok(ChunkResponse {
                success: true,
                part_tag: Some(format!("tag-{index}")),
                message: None,
            })
        })
    }

    fn complete(&self, _req: &CompleteRequest) -> BackendFuture<'_, CompleteResponse> {
        self.record(Call::Complete);
        Box::pin(async move {
            if self.fail_complete.load(Ordering::SeqCst) {
                return Ok(CompleteResponse {
                    success: false,
                    url: None,
                    message: Some("merge failed".into()),
                });
            }
            Ok(CompleteResponse {
                success: true,
                url: Some("https://storage.example/object".into()),
                message: None,
            })
        })
    }

    fn cancel(&self, _req: &CancelRequest) -> BackendFuture<'_, ()> {
        self.record(Call::Cancel);
        Box::pin(async move {
            if self.fail_cancel.load(Ordering::SeqCst) {
                return Err(BackendError::Api {
                    status: 502,
                    body: "gateway".into(),
                });
            }
            Ok(())
        })
    }
}
