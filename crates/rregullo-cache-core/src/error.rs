use thiserror::Error;

use crate::worker::WorkerState;

/// Errors surfaced by lifecycle operations.
///
/// Fetch handling never returns one of these: network failures are
/// recovered into a fallback response, and untrusted messages are dropped.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Install failed for {url}: {reason}")]
    InstallFailure { url: String, reason: String },

    #[error("Invalid asset {asset}: {reason}")]
    InvalidAsset { asset: String, reason: String },

    #[error("Worker is {actual}, expected {expected}")]
    InvalidState {
        expected: WorkerState,
        actual: WorkerState,
    },

    #[error("No active worker")]
    NoActiveWorker,

    #[error("Background sync is not configured")]
    SyncUnavailable,

    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}
