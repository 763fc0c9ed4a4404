//! Session reconciliation.
//!
//! Asks the backend what it already holds for a fingerprint and turns the
//! answer into one of three outcomes: instant completion, resume of an
//! existing session, or a fresh session.

use std::collections::HashSet;

use shardlift_protocol::{
    CheckRequest, CheckResponse, InitRequest, SessionInfo, parse_chunk_identifier,
};
use shardlift_transfer::{Chunk, UploadSession};
use tracing::{debug, warn};

use crate::backend::UploadBackend;
use crate::error::UploadError;

/// Which planned chunks the backend already acknowledges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatisfiedChunks {
    /// Explicit identifiers; authoritative whenever present.
    Identifiers(HashSet<String>),
    /// Count of leading chunks, for backends that omit identifiers.
    LegacyCount(u32),
}

impl SatisfiedChunks {
    /// Marks the matching chunks uploaded and returns the identifiers that
    /// matched a planned chunk.
    pub fn apply(&self, fingerprint: &str, chunks: &mut [Chunk]) -> HashSet<String> {
        let mut matched = HashSet::new();
        match self {
            Self::Identifiers(ids) => {
                for chunk in chunks.iter_mut() {
                    let id = chunk.identifier(fingerprint);
                    if ids.contains(&id) {
                        chunk.mark_satisfied();
                        matched.insert(id);
                    }
                }
                let foreign = ids
                    .iter()
                    .filter(|id| match parse_chunk_identifier(fingerprint, id) {
                        Some(index) => index as usize >= chunks.len(),
                        None => true,
                    })
                    .count();
                if foreign > 0 {
                    warn!(foreign, "ignoring satisfied identifiers with no planned chunk");
                }
            }
            Self::LegacyCount(count) => {
                for chunk in chunks.iter_mut().take(*count as usize) {
                    chunk.mark_satisfied();
                    matched.insert(chunk.identifier(fingerprint));
                }
            }
        }
        matched
    }
}

/// What the backend knows about a fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The object already exists in full.
    Instant { url: Option<String> },
    /// A session with prior progress exists.
    Resume {
        info: SessionInfo,
        satisfied: SatisfiedChunks,
    },
    /// Nothing known; a session must be initialized.
    Fresh,
}

/// Talks to the backend's check and initialize endpoints.
pub struct SessionReconciler<'a> {
    backend: &'a dyn UploadBackend,
}

impl<'a> SessionReconciler<'a> {
    pub fn new(backend: &'a dyn UploadBackend) -> Self {
        Self { backend }
    }

    /// Queries the backend and classifies its answer.
    pub async fn check_status(
        &self,
        fingerprint: &str,
        file_name: &str,
        file_size: u64,
        total_chunks: u32,
    ) -> Result<Decision, UploadError> {
        let req = CheckRequest {
            fingerprint: fingerprint.to_string(),
            file_name: file_name.to_string(),
            file_size,
        };
        let resp = self
            .backend
            .check(&req)
            .await
            .map_err(|e| UploadError::Reconciliation(format!("check failed: {e}")))?;
        decide(fingerprint, file_name, total_chunks, resp)
    }

    /// Opens a fresh session on the backend.
    pub async fn initialize_session(
        &self,
        fingerprint: &str,
        file_name: &str,
        file_size: u64,
        chunk_size: u64,
        total_chunks: u32,
    ) -> Result<UploadSession, UploadError> {
        let req = InitRequest {
            file_name: file_name.to_string(),
            fingerprint: fingerprint.to_string(),
            file_size,
            chunk_size,
            total_chunks,
        };
        let resp = self
            .backend
            .initialize(&req)
            .await
            .map_err(|e| UploadError::Reconciliation(format!("initialize failed: {e}")))?;

        if !resp.success {
            let reason = resp.message.unwrap_or_else(|| "backend refused".into());
            return Err(UploadError::Reconciliation(format!(
                "initialize rejected: {reason}"
            )));
        }
        let info = resp
            .session
            .ok_or_else(|| UploadError::Reconciliation("initialize returned no session".into()))?;
        check_plan(&info, total_chunks)?;

        debug!(session = %info.session_id, total_chunks, "session initialized");
        Ok(UploadSession::from_info(
            info,
            file_name,
            file_size,
            HashSet::new(),
        ))
    }
}

/// Classifies a check response.
pub fn decide(
    fingerprint: &str,
    file_name: &str,
    total_chunks: u32,
    resp: CheckResponse,
) -> Result<Decision, UploadError> {
    if resp.exists && resp.complete {
        return Ok(Decision::Instant { url: resp.url });
    }
    if !resp.exists {
        return Ok(Decision::Fresh);
    }

    let meta = resp.resume_meta.unwrap_or_default();
    let satisfied = match resp.satisfied_chunk_identifiers {
        Some(ids) => SatisfiedChunks::Identifiers(ids.into_iter().collect()),
        None if meta.uploaded_count > 0 => {
            warn!(
                uploaded = meta.uploaded_count,
                "backend sent no chunk identifiers, assuming leading chunks"
            );
            SatisfiedChunks::LegacyCount(meta.uploaded_count)
        }
        None => SatisfiedChunks::Identifiers(HashSet::new()),
    };

    let info = resp.session.unwrap_or_else(|| SessionInfo {
        session_id: fingerprint.to_string(),
        remote_upload_id: String::new(),
        object_name: file_name.to_string(),
        total_chunks: if meta.total_chunks > 0 {
            meta.total_chunks
        } else {
            total_chunks
        },
    });
    check_plan(&info, total_chunks)?;

    Ok(Decision::Resume { info, satisfied })
}

/// Both sides must agree on the chunk plan for indices to line up.
fn check_plan(info: &SessionInfo, total_chunks: u32) -> Result<(), UploadError> {
    if info.total_chunks != 0 && info.total_chunks != total_chunks {
        return Err(UploadError::Reconciliation(format!(
            "backend expects {} chunks, local plan has {total_chunks}",
            info.total_chunks
        )));
    }
    Ok(())
}
