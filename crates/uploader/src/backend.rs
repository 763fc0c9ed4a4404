//! Storage backend trait.
//!
//! `UploadBackend` is implemented by [`HttpBackend`](crate::http::HttpBackend)
//! for real servers and by in-memory mocks in tests. Keeping the engine
//! behind a trait keeps it decoupled from transport.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use shardlift_protocol::{
    CancelRequest, CheckRequest, CheckResponse, ChunkFields, ChunkResponse, CompleteRequest,
    CompleteResponse, InitRequest, InitResponse,
};

use crate::error::BackendError;

/// Boxed future returned by backend calls.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BackendError>> + Send + 'a>>;

/// Receives the cumulative number of chunk bytes handed to the transport.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Remote object-storage backend consumed by the engine.
pub trait UploadBackend: Send + Sync {
    /// Asks what the backend already holds for a fingerprint.
    fn check(&self, req: &CheckRequest) -> BackendFuture<'_, CheckResponse>;

    /// Opens a fresh upload session.
    fn initialize(&self, req: &InitRequest) -> BackendFuture<'_, InitResponse>;

    /// Sends one chunk. `progress` is called as bytes are consumed.
    fn upload_chunk(
        &self,
        fields: &ChunkFields,
        data: Vec<u8>,
        progress: ProgressFn,
    ) -> BackendFuture<'_, ChunkResponse>;

    /// Merges all parts into the final object.
    fn complete(&self, req: &CompleteRequest) -> BackendFuture<'_, CompleteResponse>;

    /// Tears down the remote session.
    fn cancel(&self, req: &CancelRequest) -> BackendFuture<'_, ()>;
}
