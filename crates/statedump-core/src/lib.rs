//! Core infrastructure for statedump.
//!
//! This crate provides language-agnostic infrastructure:
//! - Edit IR for single-pass, non-overlapping source rewrites
//! - Diff range extraction over an external `diff` tool
//! - Process execution with enforced timeouts
//! - Run configuration
//! - Pipeline stage state machine
//! - Error types, error codes and JSON output envelopes
//! - Text utilities for offsets and line numbers

pub mod config;
pub mod diff;
pub mod error;
pub mod output;
pub mod patch;
pub mod process;
pub mod stage;
pub mod text;
