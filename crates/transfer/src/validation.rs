use std::path::{Component, Path};

use crate::{TransferError, total_chunks};

/// Backend-imposed limits an upload must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    /// Largest accepted file in bytes.
    pub max_file_size: u64,
    /// Largest number of parts the backend can merge.
    pub max_chunks: u64,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024 * 1024,
            max_chunks: 10_000,
        }
    }
}

/// Checks that a file of `file_size` can be uploaded in `chunk_size` parts.
///
/// Returns the number of chunks the plan will contain.
pub fn validate_upload(
    file_size: u64,
    chunk_size: u64,
    limits: &ValidationLimits,
) -> Result<u32, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::Validation("chunk size must be positive".into()));
    }
    if file_size == 0 {
        return Err(TransferError::Validation("file is empty".into()));
    }
    if file_size > limits.max_file_size {
        return Err(TransferError::Validation(format!(
            "file size {file_size} exceeds limit {}",
            limits.max_file_size
        )));
    }

    let chunks = total_chunks(file_size, chunk_size);
    if chunks > limits.max_chunks {
        return Err(TransferError::Validation(format!(
            "{chunks} chunks exceed backend limit {}",
            limits.max_chunks
        )));
    }
    u32::try_from(chunks)
        .map_err(|_| TransferError::Validation(format!("{chunks} chunks exceed u32 range")))
}

/// Validates that a file name is usable as a remote object name.
///
/// Rejects:
/// - Empty names
/// - Anything with more than one path component (separators, `..`, `/x`)
pub fn validate_file_name(file_name: &str) -> Result<(), TransferError> {
    if file_name.trim().is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }

    let mut components = Path::new(file_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(TransferError::InvalidName(format!(
            "name must be a single path component: {file_name}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn accepts_regular_upload() {
        let n = validate_upload(23 * MIB, 5 * MIB, &ValidationLimits::default()).unwrap();
        assert_eq!(n, 5);
    }

    #[test]
    fn rejects_empty_file() {
        assert!(validate_upload(0, 5 * MIB, &ValidationLimits::default()).is_err());
    }

    #[test]
    fn rejects_zero_chunk_size() {
        assert!(validate_upload(10, 0, &ValidationLimits::default()).is_err());
    }

    #[test]
    fn rejects_oversized_file() {
        let limits = ValidationLimits {
            max_file_size: 100,
            max_chunks: 10,
        };
        let err = validate_upload(101, 50, &limits).unwrap_err();
        assert!(matches!(err, TransferError::Validation(_)));
    }

    #[test]
    fn rejects_too_many_chunks() {
        let limits = ValidationLimits {
            max_file_size: u64::MAX,
            max_chunks: 4,
        };
        assert!(validate_upload(20, 5, &limits).is_ok());
        let err = validate_upload(21, 5, &limits).unwrap_err();
        assert!(err.to_string().contains("exceed backend limit"));
    }

    #[test]
    fn accepts_simple_name() {
        assert!(validate_file_name("movie.mkv").is_ok());
        assert!(validate_file_name(".hidden").is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("   ").is_err());
    }

    #[test]
    fn rejects_names_with_components() {
        assert!(validate_file_name("../escape").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("sub/file.txt").is_err());
        assert!(validate_file_name("/tmp/file").is_err());
    }
}
