//! Resumable, content-addressed chunked upload engine.
//!
//! This crate implements the **upload logic**: it has no UI and talks to
//! storage only through the [`UploadBackend`] trait. [`HttpBackend`] is the
//! bundled implementation for HTTP+JSON servers.
//!
//! # Pipeline
//!
//! 1. **Hash**: fingerprint the file (SHA-256) for deduplication
//! 2. **Reconcile**: ask the backend what it already holds
//! 3. **Initialize**: open a session when nothing is known
//! 4. **Transfer**: send missing chunks under bounded concurrency
//! 5. **Finalize**: have the backend merge the parts

pub mod backend;
pub mod config;
pub mod error;
pub mod http;
pub mod reconciler;
mod scheduler;
mod state;
pub mod task;
pub mod transporter;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

// Re-export primary types for convenience.
pub use backend::{BackendFuture, ProgressFn, UploadBackend};
pub use config::EngineConfig;
pub use error::{BackendError, TransportError, UploadError};
pub use http::HttpBackend;
pub use reconciler::{Decision, SatisfiedChunks, SessionReconciler};
pub use shardlift_protocol::TaskState;
pub use task::UploadTask;
pub use transporter::{ChunkReceipt, ChunkTransporter};
pub use types::{SelectedFile, UploadEvent, UploadSnapshot};
