//! statedump: method-level state dumping for Java bug-fix pairs.
//!
//! Locates the methods a fix touched, rewrites them to record their entry
//! and exit state, runs the triggering tests and turns the resulting dumps
//! into a cleaned, schema-annotated archive.

// Core infrastructure - re-exported from statedump-core
pub use statedump_core::config;
pub use statedump_core::diff;
pub use statedump_core::error;
pub use statedump_core::output;
pub use statedump_core::patch;
pub use statedump_core::process;
pub use statedump_core::stage;
pub use statedump_core::text;

// Java front end and trace processing
pub use statedump_java as java;
pub use statedump_trace as trace;

// Collaborators and the pipeline
pub mod defects4j;
pub mod deps;
pub mod pipeline;

// Error bridges - converts java/trace errors to StateDumpError
mod error_bridges;
