//! Trace Loading Error Types

use std::path::PathBuf;
use thiserror::Error;

/// Errors during trace loading
#[derive(Debug, Error)]
pub enum TraceError {
    /// Trace file could not be opened or read
    #[error("Failed to read trace file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single line could not be parsed
    #[error("Line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

impl TraceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TraceError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(line: usize, reason: impl ToString) -> Self {
        TraceError::Parse {
            line,
            reason: reason.to_string(),
        }
    }
}
