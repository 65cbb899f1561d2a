//! Java support for statedump.
//!
//! This crate provides the Java side of the pipeline:
//! - Syntax tree indexing over tree-sitter-java
//! - Method signature normalization and parameter extraction
//! - Changed-method resolution from diff ranges
//! - Entry/exit instrumentation as a single non-overlapping edit set
//! - JavaDoc extraction and relevant-method ranking for the report
//! - The embedded runtime helper sources and their deployment

pub mod error;
pub mod instrument;
pub mod javadoc;
pub mod params;
pub mod relevant;
pub mod resolve;
pub mod runtime;
pub mod signature;
pub mod syntax;

pub use error::InstrumentError;
pub use instrument::{instrument_file, instrument_targets, InstrumentOptions};
pub use resolve::{build_target_set, resolve_changed_methods, TargetSet};
pub use signature::MethodSignature;
