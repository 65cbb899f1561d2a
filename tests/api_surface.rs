//! Compile-only test to verify public API surface.
//!
//! This file serves as a compile-time contract for the public API.
//! If this file fails to compile, the public API has regressed.

// Allow unused imports - this test is about compile-time verification, not runtime usage
#![allow(unused_imports)]

// ============================================================================
// Core Infrastructure Types
// ============================================================================

use statedump::patch::{Conflict, ContentHash, Edit, EditError, EditKind, EditSet, Span};

use statedump::diff::{
    compute_change_ranges, parse_unified_diff, ChangeRange, ChangeRanges, DiffError, DiffOptions,
};

use statedump::error::{OutputErrorCode, StateDumpError};

use statedump::output::{emit_response, ErrorInfo, ErrorResponse, Response, SCHEMA_VERSION};

use statedump::process::{run_command, CommandOutput, CommandSpec, CommandStatus, ProcessError};

use statedump::stage::{
    StageError, StageFailure, StageName, StageOutcome, StageRecord, StageState, StageTimeline,
};

use statedump::config::{ConfigError, RunConfig, Timeouts};

use statedump::text::{line_count, lookback};

// ============================================================================
// Java Front End
// ============================================================================

use statedump::java::instrument::{
    instrument_file, instrument_source, instrument_targets, FileInstrumentation, FileOutcome,
    InstrumentOptions, InstrumentationReport, InstrumentedMethodRecord,
};
use statedump::java::resolve::{build_target_set, resolve_changed_methods, FilePair, TargetSet};
use statedump::java::runtime::{deploy_helper_sources, dump_file_for_test, safe_test_name};
use statedump::java::signature::MethodSignature;
use statedump::java::syntax::{parse_java, MethodKind};
use statedump::java::InstrumentError;

// ============================================================================
// Trace Processing
// ============================================================================

use statedump::trace::clean::{clean_record, clean_value, sanitize_key};
use statedump::trace::collect::{collect, collect_safe, collect_with, CollectOptions, Collection};
use statedump::trace::merge::{merge_json_files, MergeStats};
use statedump::trace::postprocess::{process, process_dirs, sanitize_path};
use statedump::trace::schema::SchemaBuilder;
use statedump::trace::{ProcessOptions, ProcessStats, TestOutcome, TestResults, TraceError};

// ============================================================================
// Pipeline
// ============================================================================

use statedump::defects4j::{BenchmarkTool, Defects4j, Revision, TestRun};
use statedump::deps::{jackson_artifacts, Artifact, ArtifactCache, Downloader};
use statedump::pipeline::{run_bug, run_matrix, BugId, BugReport};

// ============================================================================
// Test
// ============================================================================

#[test]
fn api_surface_compiles() {
    // The imports above form the public API contract.
    let _ = std::any::type_name::<Span>();
    let _ = std::any::type_name::<StateDumpError>();
    let _ = std::any::type_name::<MethodSignature>();
    let _ = std::any::type_name::<SchemaBuilder>();
    let _ = std::any::type_name::<BugReport>();
}

#[test]
fn schema_version_is_stable() {
    assert_eq!(SCHEMA_VERSION, "1");
}

#[test]
fn domain_errors_convert_to_unified_error() {
    let err: StateDumpError = TraceError::DumpsMissing {
        path: "/w/dumps".into(),
    }
    .into();
    assert_eq!(err.error_code(), OutputErrorCode::ResolutionError);
}
