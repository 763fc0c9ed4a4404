use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::types::Chunk;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Number of chunks a file of `file_size` bytes splits into.
///
/// A `chunk_size` of 0 selects [`DEFAULT_CHUNK_SIZE`].
pub fn total_chunks(file_size: u64, chunk_size: u64) -> u64 {
    let chunk_size = effective_chunk_size(chunk_size);
    file_size.div_ceil(chunk_size)
}

/// Splits `file_size` bytes into contiguous, non-empty chunks.
///
/// The result depends only on `(file_size, chunk_size)`, so client and
/// backend agree on chunk indices without exchanging byte ranges. Only the
/// last chunk may be shorter than `chunk_size`.
pub fn plan_chunks(file_size: u64, chunk_size: u64) -> Vec<Chunk> {
    let chunk_size = effective_chunk_size(chunk_size);
    let mut chunks = Vec::with_capacity(total_chunks(file_size, chunk_size) as usize);
    let mut start = 0u64;
    let mut index = 0u32;
    while start < file_size {
        let end = start.saturating_add(chunk_size).min(file_size);
        chunks.push(Chunk::new(index, start, end));
        start = end;
        index += 1;
    }
    chunks
}

fn effective_chunk_size(chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    }
}

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// ChunkSource
// ---------------------------------------------------------------------------

/// Lazily reads planned chunk ranges from the source file.
///
/// Each read opens its own handle so concurrent transfers never share a
/// file cursor.
#[derive(Debug, Clone)]
pub struct ChunkSource {
    path: PathBuf,
}

impl ChunkSource {
    /// Creates a source backed by the file at `path`.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Reads the bytes of `chunk`.
    pub async fn read(&self, chunk: &Chunk) -> Result<Vec<u8>, TransferError> {
        let read_err = |source| TransferError::Read {
            offset: chunk.byte_start,
            source,
        };

        let mut file = tokio::fs::File::open(&self.path).await.map_err(read_err)?;
        file.seek(SeekFrom::Start(chunk.byte_start))
            .await
            .map_err(read_err)?;

        let mut buf = vec![0u8; chunk.len() as usize];
        file.read_exact(&mut buf).await.map_err(read_err)?;
        Ok(buf)
    }
}
