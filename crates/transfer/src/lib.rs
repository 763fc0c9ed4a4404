//! Chunk planning, content fingerprints and transfer speed tracking.
//!
//! Everything here is transport-agnostic: the uploader crate composes these
//! pieces with a backend to run the actual upload.

mod chunked;
mod hasher;
mod progress;
mod types;
mod validation;

pub use chunked::{ChunkSource, checksum_bytes, plan_chunks, total_chunks};
pub use hasher::{HashProgress, hash_file};
pub use progress::{SpeedSnapshot, SpeedTracker};
pub use types::{Chunk, UploadSession};
pub use validation::{ValidationLimits, validate_file_name, validate_upload};

/// Default transfer chunk size: 5 MiB.
///
/// Matches the smallest part size multipart object stores accept for every
/// part but the last.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default read window used while fingerprinting: 2 MiB.
pub const DEFAULT_HASH_WINDOW: usize = 2 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("read failed at offset {offset}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid file name: {0}")]
    InvalidName(String),
}
