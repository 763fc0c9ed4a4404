/// Endpoint path for the "check" reconciliation call.
pub const CHECK_PATH: &str = "/check";

/// Endpoint path for session initialization.
pub const INIT_PATH: &str = "/init";

/// Endpoint path for multipart chunk uploads.
pub const CHUNK_PATH: &str = "/chunk";

/// Endpoint path for server-side finalization.
pub const COMPLETE_PATH: &str = "/complete";

/// Endpoint path for remote session teardown.
pub const CANCEL_PATH: &str = "/cancel";

/// Multipart field names of a chunk upload.
pub mod fields {
    pub const CHUNK: &str = "chunk";
    pub const FILE_NAME: &str = "fileName";
    pub const FINGERPRINT: &str = "fingerprint";
    pub const CHUNK_INDEX: &str = "chunkIndex";
    pub const CHUNK_FINGERPRINT: &str = "chunkFingerprint";
}

const CHUNK_MARKER: &str = "_chunk_";

/// Builds the identifier both sides use for chunk `index` of `fingerprint`.
pub fn chunk_identifier(fingerprint: &str, index: u32) -> String {
    format!("{fingerprint}{CHUNK_MARKER}{index}")
}

/// Extracts the chunk index from an identifier, provided it belongs to
/// `fingerprint`. Identifiers for other files or malformed ones yield `None`.
pub fn parse_chunk_identifier(fingerprint: &str, identifier: &str) -> Option<u32> {
    identifier
        .strip_prefix(fingerprint)?
        .strip_prefix(CHUNK_MARKER)?
        .parse()
        .ok()
}
