//! Ingestion Error Types

use thiserror::Error;

/// Errors that end a client session
#[derive(Debug, Error)]
pub enum IngestError {
    /// Replay server could not be reached
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Socket read or write failed mid-session
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// Receiver task panicked or was cancelled
    #[error("Receiver task failed: {0}")]
    Receiver(String),
}
