//! Tests for the error bridges converting Java and trace errors into
//! `StateDumpError`.
//!
//! The `From` impls themselves live in `statedump-java` and `statedump-trace`
//! (the crates owning the source error types), since the orphan rule forbids
//! implementing a foreign trait for two foreign types here.

#[cfg(test)]
mod tests {
    use statedump_core::error::StateDumpError;
    use statedump_java::InstrumentError;
    use statedump_trace::TraceError;
    use statedump_core::error::OutputErrorCode;
    use std::path::PathBuf;

    #[test]
    fn missing_source_is_resolution_error() {
        let err: StateDumpError = InstrumentError::NotFound {
            path: PathBuf::from("A.java"),
        }
        .into();
        assert_eq!(err.error_code(), OutputErrorCode::ResolutionError);
    }

    #[test]
    fn write_failure_is_apply_error() {
        let err: StateDumpError = InstrumentError::Write {
            path: PathBuf::from("A.java"),
            source: std::io::Error::other("disk full"),
        }
        .into();
        match err {
            StateDumpError::ApplyError { file, .. } => assert_eq!(file.as_deref(), Some("A.java")),
            other => panic!("Expected ApplyError, got {:?}", other),
        }
    }

    #[test]
    fn missing_dumps_is_resolution_error() {
        let err: StateDumpError = TraceError::DumpsMissing {
            path: PathBuf::from("/w/dumps"),
        }
        .into();
        assert_eq!(err.error_code(), OutputErrorCode::ResolutionError);
    }

    #[test]
    fn merge_target_not_a_directory_is_resolution_error() {
        let err: StateDumpError = TraceError::NotADirectory {
            path: PathBuf::from("/out/Lang"),
        }
        .into();
        match err {
            StateDumpError::FileNotFound { path } => assert_eq!(path, "/out/Lang"),
            other => panic!("Expected FileNotFound, got {:?}", other),
        }
    }
}
