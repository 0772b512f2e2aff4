//! Protocol Error Types

use thiserror::Error;

/// Errors that can occur while decoding a CAN payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Identifier is not one of the three known messages
    #[error("Unrecognized CAN identifier: {0}")]
    Unrecognized(String),

    /// Payload is not exactly 16 hex characters
    #[error("Invalid payload length: expected 16 hex characters, got {0}")]
    InvalidLength(usize),

    /// Payload contains a non-hex character
    #[error("Invalid hex payload: {0}")]
    InvalidHex(String),
}

/// Errors that can occur while parsing a wire line
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WireError {
    /// Line is empty or has too few fields
    #[error("Truncated message: {0}")]
    Truncated(String),

    /// Unknown leading tag or CAN reading kind
    #[error("Unknown message kind: {0}")]
    UnknownKind(String),

    /// Timestamp field is not a finite, non-negative offset
    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}
