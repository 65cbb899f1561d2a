//! Error types for the Java front end.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use statedump_core::error::StateDumpError;
use statedump_core::patch::EditError;

/// Errors raised while instrumenting a Java source file.
///
/// Per-method problems (unsupported bodies, already instrumented methods) are
/// not errors; they are recorded as skips on the file result.
#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The generated edits overlap or fall outside the buffer.
    #[error("invalid edit set for {}: {source}", path.display())]
    Edit {
        path: PathBuf,
        #[source]
        source: EditError,
    },

    #[error("cannot serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl InstrumentError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            InstrumentError::NotFound { path }
        } else {
            InstrumentError::Read { path, source }
        }
    }

    /// The offending file, when the error is tied to one.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            InstrumentError::NotFound { path }
            | InstrumentError::Read { path, .. }
            | InstrumentError::Write { path, .. }
            | InstrumentError::Edit { path, .. } => Some(path),
            InstrumentError::Serialize(_) => None,
        }
    }
}

// ============================================================================
// Bridge: InstrumentError -> StateDumpError
// ============================================================================

impl From<InstrumentError> for StateDumpError {
    fn from(err: InstrumentError) -> Self {
        match err {
            InstrumentError::NotFound { path } => StateDumpError::FileNotFound {
                path: path.display().to_string(),
            },
            InstrumentError::Edit { path, source } => StateDumpError::ApplyError {
                message: source.to_string(),
                file: Some(path.display().to_string()),
            },
            InstrumentError::Write { path, source } => StateDumpError::ApplyError {
                message: format!("cannot write: {}", source),
                file: Some(path.display().to_string()),
            },
            other @ (InstrumentError::Read { .. } | InstrumentError::Serialize(_)) => {
                StateDumpError::InternalError {
                    message: other.to_string(),
                }
            }
        }
    }
}
