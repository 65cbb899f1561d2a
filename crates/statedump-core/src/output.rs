//! JSON output types for CLI responses.
//!
//! Every CLI command prints exactly one JSON object to stdout: either an
//! `ok` envelope wrapping the command's payload, or an `error` envelope with
//! a stable numeric code.

use serde::{Deserialize, Serialize};
use std::io::{self, Write};

use crate::error::{OutputErrorCode, StateDumpError};

/// Schema version for all JSON responses.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Success Envelope
// ============================================================================

/// Successful response wrapping a command payload.
///
/// The payload's fields are flattened next to `status` and `schema_version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response<T> {
    pub status: String,
    pub schema_version: String,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Response<T> {
    pub fn ok(data: T) -> Self {
        Response {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            data,
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error information for error responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric error code.
    pub code: u8,
    /// Human-readable message.
    pub message: String,
    /// Error-specific structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorInfo {
    /// Create from a StateDumpError.
    pub fn from_error(err: &StateDumpError) -> Self {
        let code = OutputErrorCode::from(err).code();
        let details = match err {
            StateDumpError::InvalidArguments { details, .. } => details.clone(),
            StateDumpError::ApplyError {
                file: Some(file), ..
            } => Some(serde_json::json!({ "file": file })),
            StateDumpError::StageFailed { stage, .. } => {
                Some(serde_json::json!({ "stage": stage }))
            }
            _ => None,
        };
        ErrorInfo {
            code,
            message: err.to_string(),
            details,
        }
    }
}

/// Error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub schema_version: String,
    pub error: ErrorInfo,
}

impl ErrorResponse {
    /// Create an error response from a StateDumpError.
    pub fn from_error(err: &StateDumpError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

// ============================================================================
// Emission
// ============================================================================

/// Emit a response as pretty-printed JSON to a writer.
///
/// This is the single output path for the CLI. The output is deterministic:
/// the same input produces identical bytes.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Payload {
        files: u32,
    }

    #[test]
    fn ok_envelope_flattens_payload() {
        let mut buf = Vec::new();
        emit_response(&Response::ok(Payload { files: 2 }), &mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["schema_version"], SCHEMA_VERSION);
        assert_eq!(value["files"], 2);
    }

    #[test]
    fn error_envelope_carries_code_and_details() {
        let err = StateDumpError::stage_failed("compile", "exit code 1");
        let response = ErrorResponse::from_error(&err);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["code"], 5);
        assert_eq!(value["error"]["details"]["stage"], "compile");
    }

    #[test]
    fn error_without_details_omits_field() {
        let err = StateDumpError::internal("boom");
        let json = serde_json::to_string(&ErrorResponse::from_error(&err)).unwrap();
        assert!(!json.contains("details"));
    }

    #[test]
    fn emit_is_deterministic() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        emit_response(&Response::ok(Payload { files: 7 }), &mut a).unwrap();
        emit_response(&Response::ok(Payload { files: 7 }), &mut b).unwrap();
        assert_eq!(a, b);
        assert!(a.ends_with(b"\n"));
    }
}
