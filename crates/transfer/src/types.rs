use std::collections::HashSet;
use std::time::Instant;

use shardlift_protocol::{SessionInfo, chunk_identifier};

/// A planned byte range of the source file, the unit of network transfer.
///
/// The range is fixed once planned. Transfer bookkeeping (`uploaded`,
/// `bytes_sent`, `retry_count`, timestamps) is only touched by the
/// scheduler pass that owns the chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Zero-based position of the chunk within the file.
    pub index: u32,
    /// First byte of the range (inclusive).
    pub byte_start: u64,
    /// End of the range (exclusive).
    pub byte_end: u64,
    /// SHA-256 hex digest of the chunk bytes, once computed.
    pub fingerprint: Option<String>,
    /// Set when the backend acknowledged the chunk.
    pub uploaded: bool,
    /// Bytes of the current attempt handed to the transport.
    pub bytes_sent: u64,
    /// Failed attempts so far.
    pub retry_count: u32,
    pub transfer_started_at: Option<Instant>,
    pub transfer_ended_at: Option<Instant>,
    /// Integrity tag returned by the backend, needed at finalize time.
    pub part_tag: Option<String>,
}

impl Chunk {
    /// Creates a pending chunk covering `byte_start..byte_end`.
    pub fn new(index: u32, byte_start: u64, byte_end: u64) -> Self {
        Self {
            index,
            byte_start,
            byte_end,
            fingerprint: None,
            uploaded: false,
            bytes_sent: 0,
            retry_count: 0,
            transfer_started_at: None,
            transfer_ended_at: None,
            part_tag: None,
        }
    }

    /// Size of the range in bytes.
    pub fn len(&self) -> u64 {
        self.byte_end - self.byte_start
    }

    /// Planned chunks are never empty; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.byte_end == self.byte_start
    }

    /// Identifier shared with the backend for this chunk of `fingerprint`.
    pub fn identifier(&self, fingerprint: &str) -> String {
        chunk_identifier(fingerprint, self.index)
    }

    /// Progress of the chunk in percent (0–100).
    pub fn progress_percent(&self) -> f64 {
        if self.uploaded {
            return 100.0;
        }
        let len = self.len();
        if len == 0 {
            return 0.0;
        }
        (self.bytes_sent.min(len) as f64 / len as f64) * 100.0
    }

    /// Bytes this chunk contributes to the uploaded total right now.
    pub fn uploaded_bytes(&self) -> u64 {
        if self.uploaded {
            self.len()
        } else {
            self.bytes_sent.min(self.len())
        }
    }

    /// Records the start of a transfer attempt.
    pub fn begin_attempt(&mut self, now: Instant) {
        self.bytes_sent = 0;
        self.transfer_started_at = Some(now);
        self.transfer_ended_at = None;
    }

    /// Marks the chunk acknowledged by the backend.
    pub fn mark_uploaded(&mut self, part_tag: Option<String>, now: Instant) {
        self.uploaded = true;
        self.bytes_sent = self.len();
        self.part_tag = part_tag;
        self.transfer_ended_at = Some(now);
    }

    /// Marks the chunk as already held by the backend (resume).
    pub fn mark_satisfied(&mut self) {
        self.uploaded = true;
        self.bytes_sent = self.len();
    }

    /// Drops partial progress; the next attempt re-sends the whole range.
    pub fn reset_progress(&mut self) {
        if !self.uploaded {
            self.bytes_sent = 0;
            self.transfer_ended_at = None;
        }
    }

    /// Throughput of the last successful attempt in bytes/second.
    pub fn throughput(&self) -> Option<f64> {
        let started = self.transfer_started_at?;
        let ended = self.transfer_ended_at?;
        let secs = ended.duration_since(started).as_secs_f64();
        if secs <= 0.0 {
            return None;
        }
        Some(self.len() as f64 / secs)
    }
}

/// A remote upload session correlating a fingerprint with its parts.
///
/// Built once by the reconciler and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSession {
    pub session_id: String,
    pub remote_upload_id: String,
    pub object_name: String,
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: u32,
    /// Chunk identifiers the backend already holds.
    pub satisfied: HashSet<String>,
}

impl UploadSession {
    /// Builds a session from the backend's session description.
    pub fn from_info(
        info: SessionInfo,
        file_name: &str,
        file_size: u64,
        satisfied: HashSet<String>,
    ) -> Self {
        Self {
            session_id: info.session_id,
            remote_upload_id: info.remote_upload_id,
            object_name: info.object_name,
            file_name: file_name.to_string(),
            file_size,
            total_chunks: info.total_chunks,
            satisfied,
        }
    }

    /// Returns `true` if the backend reported `identifier` as received.
    pub fn is_satisfied(&self, identifier: &str) -> bool {
        self.satisfied.contains(identifier)
    }
}
