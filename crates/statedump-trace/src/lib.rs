//! Trace post-processing for statedump.
//!
//! This crate turns the raw per-test dump files written by the Java runtime
//! into the curated archive:
//! - Record cleaning (sentinel removal, empty-container cascade, key sanitization)
//! - Genson-compatible JSON Schema inference
//! - Per-method, per-phase schema generation over dump directories
//! - Merging a collected tree into a single JSON document
//! - Collection of dumps into `<output>/<project>/<bug>/{correct,wrong,schemas}`

pub mod clean;
pub mod collect;
pub mod error;
pub mod merge;
pub mod postprocess;
pub mod schema;

pub use collect::{collect, collect_safe, TestOutcome, TestResults};
pub use error::TraceError;
pub use merge::{merge_json_files, MergeStats};
pub use postprocess::{process, process_dirs, ProcessOptions, ProcessStats};
