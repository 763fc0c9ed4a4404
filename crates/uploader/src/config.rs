//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shardlift_transfer::{DEFAULT_CHUNK_SIZE, DEFAULT_HASH_WINDOW, ValidationLimits};

/// Tunables of the upload engine.
///
/// Deserializes from a partial table; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Transfer chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Read window used while fingerprinting, in bytes.
    #[serde(default = "default_hash_window")]
    pub hash_window: usize,

    /// Maximum simultaneous chunk transfers.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempts per chunk before the pass fails.
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,

    /// Base of the linear backoff (`attempt * base`), in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Per-chunk transfer timeout in seconds.
    #[serde(default = "default_chunk_timeout_secs")]
    pub chunk_timeout_secs: u64,

    /// Largest accepted file in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Largest number of parts the backend merges.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: u64,

    /// Send a SHA-256 of every chunk for server-side verification.
    #[serde(default = "default_true")]
    pub chunk_fingerprints: bool,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_hash_window() -> usize {
    DEFAULT_HASH_WINDOW
}

fn default_concurrency() -> usize {
    3
}

fn default_retry_times() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_chunk_timeout_secs() -> u64 {
    60
}

fn default_max_file_size() -> u64 {
    ValidationLimits::default().max_file_size
}

fn default_max_chunks() -> u64 {
    ValidationLimits::default().max_chunks
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            hash_window: default_hash_window(),
            concurrency: default_concurrency(),
            retry_times: default_retry_times(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            chunk_timeout_secs: default_chunk_timeout_secs(),
            max_file_size: default_max_file_size(),
            max_chunks: default_max_chunks(),
            chunk_fingerprints: default_true(),
        }
    }
}

impl EngineConfig {
    /// Concurrency clamped to at least one transfer.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    /// Attempts per chunk, at least one.
    pub fn effective_retry_times(&self) -> u32 {
        self.retry_times.max(1)
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(u64::from(attempt)))
    }

    /// Per-chunk transfer timeout.
    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    /// Size limits for validation.
    pub fn limits(&self) -> ValidationLimits {
        ValidationLimits {
            max_file_size: self.max_file_size,
            max_chunks: self.max_chunks,
        }
    }
}
