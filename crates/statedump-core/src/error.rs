//! Error types and error code constants for statedump.
//!
//! This module provides a unified error type (`StateDumpError`) that bridges
//! domain-specific errors from the subsystems (diff, edits, processes,
//! configuration, stages) into a common format suitable for JSON output.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments (bad input from caller)
//! - `3`: Resolution errors (file not found, diff unavailable)
//! - `4`: Apply errors (edit set rejected, write-back failed)
//! - `5`: Stage failed (an external tool or pipeline stage failed)
//! - `10`: Internal errors (bugs, unexpected state)
//!
//! ## Design
//!
//! - **Unified type**: `StateDumpError` is the single error type for CLI output
//! - **Bridging**: `impl From<X> for StateDumpError` bridges domain errors
//! - **Code mapping**: `OutputErrorCode` provides stable integer codes for JSON

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::diff::DiffError;
use crate::patch::EditError;
use crate::process::ProcessError;
use crate::stage::StageError;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output.
///
/// These codes map to CLI exit codes and appear in JSON error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller (bad input, malformed request).
    InvalidArguments = 2,
    /// Resolution errors (file not found, diff unavailable).
    ResolutionError = 3,
    /// Apply errors (overlapping edits, failed write-back).
    ApplyError = 4,
    /// A pipeline stage or external tool failed.
    StageFailed = 5,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
///
/// All subsystem errors are converted to this type before being rendered as
/// JSON output. Each variant includes enough context to produce a helpful
/// message and an optional `details` field.
#[derive(Debug, Error)]
pub enum StateDumpError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// File not found or not readable.
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// The external diff tool could not produce a result.
    #[error("diff unavailable: {message}")]
    DiffUnavailable { message: String },

    /// Failed to apply edits or write results back.
    #[error("apply error: {message}")]
    ApplyError {
        message: String,
        file: Option<String>,
    },

    /// A pipeline stage or external tool failed.
    #[error("stage {stage} failed: {message}")]
    StageFailed { stage: String, message: String },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&StateDumpError> for OutputErrorCode {
    fn from(err: &StateDumpError) -> Self {
        match err {
            StateDumpError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            StateDumpError::FileNotFound { .. } => OutputErrorCode::ResolutionError,
            StateDumpError::DiffUnavailable { .. } => OutputErrorCode::ResolutionError,
            StateDumpError::ApplyError { .. } => OutputErrorCode::ApplyError,
            StateDumpError::StageFailed { .. } => OutputErrorCode::StageFailed,
            StateDumpError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<StateDumpError> for OutputErrorCode {
    fn from(err: StateDumpError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Bridges: core domain errors -> StateDumpError
// ============================================================================

impl From<DiffError> for StateDumpError {
    fn from(err: DiffError) -> Self {
        match err {
            DiffError::FileAccess { path, .. } => StateDumpError::FileNotFound {
                path: path.display().to_string(),
            },
            other @ (DiffError::Unavailable { .. } | DiffError::TimedOut { .. }) => {
                StateDumpError::DiffUnavailable {
                    message: other.to_string(),
                }
            }
            other @ DiffError::MalformedHunk { .. } => StateDumpError::InternalError {
                message: other.to_string(),
            },
        }
    }
}

impl From<EditError> for StateDumpError {
    fn from(err: EditError) -> Self {
        StateDumpError::ApplyError {
            message: err.to_string(),
            file: None,
        }
    }
}

impl From<ProcessError> for StateDumpError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::EmptyCommand => StateDumpError::invalid_args("empty command"),
            ProcessError::Spawn { program, source } => StateDumpError::StageFailed {
                stage: program,
                message: format!("failed to spawn: {}", source),
            },
            ProcessError::Io(io_err) => StateDumpError::InternalError {
                message: format!("IO error: {}", io_err),
            },
        }
    }
}

impl From<ConfigError> for StateDumpError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Read { path, .. } => StateDumpError::FileNotFound {
                path: path.display().to_string(),
            },
            other => StateDumpError::InvalidArguments {
                message: other.to_string(),
                details: None,
            },
        }
    }
}

impl From<StageError> for StateDumpError {
    fn from(err: StageError) -> Self {
        StateDumpError::InternalError {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for StateDumpError {
    fn from(err: std::io::Error) -> Self {
        StateDumpError::InternalError {
            message: format!("IO error: {}", err),
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl StateDumpError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        StateDumpError::InvalidArguments {
            message: message.into(),
            details: None,
        }
    }

    /// Create an invalid arguments error with JSON details.
    pub fn invalid_args_with_details(
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        StateDumpError::InvalidArguments {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        StateDumpError::FileNotFound { path: path.into() }
    }

    /// Create a stage failure.
    pub fn stage_failed(stage: impl Into<String>, message: impl Into<String>) -> Self {
        StateDumpError::StageFailed {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        StateDumpError::InternalError {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================
