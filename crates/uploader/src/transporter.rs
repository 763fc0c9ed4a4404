//! Single-chunk transfer with timeout and cancellation.

use std::sync::Arc;
use std::time::Duration;

use shardlift_protocol::ChunkFields;
use tokio_util::sync::CancellationToken;

use crate::backend::{ProgressFn, UploadBackend};
use crate::error::TransportError;

/// Backend acknowledgement of a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReceipt {
    pub part_tag: Option<String>,
}

/// Sends one chunk to the backend.
///
/// Cancellation and timeout are reported as distinct errors: a cancelled
/// transfer is not a failure, a timed-out one is retryable.
#[derive(Clone)]
pub struct ChunkTransporter {
    backend: Arc<dyn UploadBackend>,
    timeout: Duration,
}

impl ChunkTransporter {
    pub fn new(backend: Arc<dyn UploadBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Uploads `data` for the chunk described by `fields`.
    pub async fn send(
        &self,
        fields: &ChunkFields,
        data: Vec<u8>,
        cancel: &CancellationToken,
        progress: ProgressFn,
    ) -> Result<ChunkReceipt, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let upload = self.backend.upload_chunk(fields, data, progress);
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(TransportError::Cancelled);
            }
            result = tokio::time::timeout(self.timeout, upload) => {
                match result {
                    Ok(Ok(resp)) => resp,
                    Ok(Err(e)) => return Err(TransportError::Network(e.to_string())),
                    Err(_) => return Err(TransportError::Timeout),
                }
            }
        };

        if !resp.success {
            let reason = resp.message.unwrap_or_else(|| "chunk rejected".into());
            return Err(TransportError::Network(reason));
        }
        Ok(ChunkReceipt {
            part_tag: resp.part_tag,
        })
    }
}
