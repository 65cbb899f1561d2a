//! Error types for trace processing.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use statedump_core::error::StateDumpError;

/// Errors raised while post-processing or collecting dumps.
#[derive(Debug, Error)]
pub enum TraceError {
    /// `<work_dir>/dumps` does not exist.
    #[error("dumps directory not found: {}", path.display())]
    DumpsMissing { path: PathBuf },

    /// A path expected to be a directory is missing or is a file.
    #[error("not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Parsed, but not a JSON array of records.
    #[error("invalid dump {}: {reason}", path.display())]
    InvalidDump { path: PathBuf, reason: String },
}


// ============================================================================
// Bridge: TraceError -> StateDumpError
// ============================================================================

impl From<TraceError> for StateDumpError {
    fn from(err: TraceError) -> Self {
        match err {
            TraceError::DumpsMissing { path } | TraceError::NotADirectory { path } => {
                StateDumpError::FileNotFound {
                    path: path.display().to_string(),
                }
            }
            other => StateDumpError::InternalError {
                message: other.to_string(),
            },
        }
    }
}
impl TraceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TraceError::Io {
            path: path.into(),
            source,
        }
    }
}
