//! Wire types for the chunked upload backend.
//!
//! Every request and response exchanged with the storage backend lives here
//! so that the engine, the HTTP backend and the fixture tests agree on one
//! JSON shape.

pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{chunk_identifier, parse_chunk_identifier};
pub use messages::{
    CancelRequest, CheckRequest, CheckResponse, ChunkFields, ChunkResponse, CompleteRequest,
    CompleteResponse, InitRequest, InitResponse,
};
pub use types::{ResumeMeta, SessionInfo, TaskState};
