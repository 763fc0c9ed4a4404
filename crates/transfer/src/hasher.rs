use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::{DEFAULT_HASH_WINDOW, TransferError};

/// Progress of a running fingerprint computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HashProgress {
    pub bytes_processed: u64,
    pub total_bytes: u64,
    pub percent: f64,
}

/// Computes the SHA-256 fingerprint of the file at `path`.
///
/// The file is streamed in `window`-sized reads (0 selects
/// [`DEFAULT_HASH_WINDOW`]) and `on_progress` is called after each window.
/// The task yields between windows so a large file never monopolizes the
/// runtime; dropping the future stops hashing at the next window.
pub async fn hash_file<F>(path: &Path, window: usize, mut on_progress: F) -> Result<String, TransferError>
where
    F: FnMut(HashProgress),
{
    let window = if window == 0 {
        DEFAULT_HASH_WINDOW
    } else {
        window
    };

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|source| TransferError::Read { offset: 0, source })?;
    let total_bytes = file
        .metadata()
        .await
        .map_err(|source| TransferError::Read { offset: 0, source })?
        .len();

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; window];
    let mut processed = 0u64;

    loop {
        let n = fill_window(&mut file, &mut buf)
            .await
            .map_err(|source| TransferError::Read {
                offset: processed,
                source,
            })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        processed += n as u64;

        let percent = if total_bytes == 0 {
            100.0
        } else {
            (processed.min(total_bytes) as f64 / total_bytes as f64) * 100.0
        };
        on_progress(HashProgress {
            bytes_processed: processed,
            total_bytes,
            percent,
        });

        tokio::task::yield_now().await;
    }

    if processed != total_bytes {
        return Err(TransferError::Read {
            offset: processed,
            source: std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("file changed while hashing: expected {total_bytes} bytes, read {processed}"),
            ),
        });
    }

    let fingerprint = hex::encode(hasher.finalize());
    debug!(path = %path.display(), bytes = processed, %fingerprint, "fingerprint computed");
    Ok(fingerprint)
}

/// Reads until `buf` is full or EOF; returns the number of bytes read.
async fn fill_window(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
