//! Replay Error Types

use thiserror::Error;

/// Errors that can occur while serving a replay
#[derive(Debug, Error)]
pub enum ReplayError {
    /// A trace has no records
    #[error("{0} trace contains no data, cannot start replay")]
    EmptyTrace(&'static str),

    /// Listening socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Client did not open the session with START
    #[error("Unexpected handshake from client: {0}")]
    Handshake(String),

    /// Socket read or write failed during a session
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),
}
