//! Diff range extraction.
//!
//! Runs the external line-oriented `diff` utility in unified mode between two
//! revisions of a file and converts its hunks into 1-indexed, inclusive line
//! ranges per side: lines deleted from the left file and lines added to the
//! right file.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::process::{run_command, CommandSpec, CommandStatus, ProcessError};

/// Inclusive, 1-indexed line range `(start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChangeRange {
    pub start: u32,
    pub end: u32,
}

impl ChangeRange {
    pub fn new(start: u32, end: u32) -> Self {
        ChangeRange { start, end }
    }

    /// Check if the inclusive line span `[start, end]` intersects this range.
    pub fn intersects(&self, start: u32, end: u32) -> bool {
        start <= self.end && end >= self.start
    }
}

/// Changed line ranges on both sides of a diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRanges {
    /// Lines removed from the left (buggy) file.
    pub left: Vec<ChangeRange>,
    /// Lines added to the right (fixed) file.
    pub right: Vec<ChangeRange>,
}

impl ChangeRanges {
    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }
}

/// Options for running the diff tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    /// Unified context width passed as `-U<n>`. Wider context only changes
    /// which lines are reported, not how ranges are intersected.
    pub context: u32,
    /// Diff executable.
    pub program: String,
    pub timeout: Duration,
}

impl Default for DiffOptions {
    fn default() -> Self {
        DiffOptions {
            context: 0,
            program: "diff".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Errors from computing change ranges.
#[derive(Debug, Error)]
pub enum DiffError {
    /// One of the inputs could not be opened for reading.
    #[error("cannot read {}: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The diff tool could not be run or reported trouble.
    #[error("diff unavailable: {message}")]
    Unavailable { message: String },

    #[error("diff timed out after {0:?}")]
    TimedOut(Duration),

    /// A hunk header could not be parsed.
    #[error("malformed hunk header: {header}")]
    MalformedHunk { header: String },
}

impl From<ProcessError> for DiffError {
    fn from(err: ProcessError) -> Self {
        DiffError::Unavailable {
            message: err.to_string(),
        }
    }
}

/// Compute changed line ranges between `path_a` (left) and `path_b` (right).
///
/// Identical files yield two empty lists. Either file being unreadable
/// fails the whole pair; no partial result is returned.
pub fn compute_change_ranges(
    path_a: &Path,
    path_b: &Path,
    options: &DiffOptions,
) -> Result<ChangeRanges, DiffError> {
    for path in [path_a, path_b] {
        File::open(path).map_err(|source| DiffError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let spec = CommandSpec::new(&options.program)
        .arg(format!("-U{}", options.context))
        .arg(path_a.to_string_lossy())
        .arg(path_b.to_string_lossy())
        .timeout(options.timeout);
    let output = run_command(&spec)?;

    match output.status {
        CommandStatus::Exited(0) => Ok(ChangeRanges::default()),
        CommandStatus::Exited(1) => {
            let ranges = parse_unified_diff(&output.stdout)?;
            debug!(
                left = ranges.left.len(),
                right = ranges.right.len(),
                "diff {} {}",
                path_a.display(),
                path_b.display()
            );
            Ok(ranges)
        }
        CommandStatus::TimedOut => Err(DiffError::TimedOut(output.duration)),
        _ => Err(DiffError::Unavailable {
            message: output.failure_summary(),
        }),
    }
}

static HUNK_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap());

/// Parse unified diff text into per-side changed line ranges.
///
/// Contiguous changed lines are coalesced within a hunk only; runs are never
/// merged across hunk boundaries or across an unchanged gap.
pub fn parse_unified_diff(text: &str) -> Result<ChangeRanges, DiffError> {
    let mut ranges = ChangeRanges::default();
    let mut hunk: Option<HunkCursor> = None;

    for line in text.lines() {
        if line.starts_with("@@") {
            if let Some(done) = hunk.take() {
                done.finish(&mut ranges);
            }
            let caps = HUNK_HEADER
                .captures(line)
                .ok_or_else(|| DiffError::MalformedHunk {
                    header: line.to_string(),
                })?;
            let number = |i: usize| -> u32 {
                caps.get(i)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(0)
            };
            hunk = Some(HunkCursor::new(number(1), number(3)));
            continue;
        }

        let Some(cursor) = hunk.as_mut() else {
            // File headers (`---`/`+++`) and anything before the first hunk.
            continue;
        };

        match line.as_bytes().first() {
            Some(b'-') => cursor.deleted(),
            Some(b'+') => cursor.added(),
            Some(b' ') => cursor.context(),
            Some(b'\\') => {}
            // Some diff builds emit bare empty context lines.
            None => cursor.context(),
            Some(_) => {}
        }
    }

    if let Some(done) = hunk.take() {
        done.finish(&mut ranges);
    }
    Ok(ranges)
}

/// Walks one hunk body, tracking the current line on each side.
struct HunkCursor {
    left_line: u32,
    right_line: u32,
    left: RunBuilder,
    right: RunBuilder,
}

impl HunkCursor {
    fn new(left_start: u32, right_start: u32) -> Self {
        HunkCursor {
            left_line: left_start,
            right_line: right_start,
            left: RunBuilder::default(),
            right: RunBuilder::default(),
        }
    }

    fn deleted(&mut self) {
        self.left.record(self.left_line);
        self.left_line += 1;
    }

    fn added(&mut self) {
        self.right.record(self.right_line);
        self.right_line += 1;
    }

    fn context(&mut self) {
        self.left_line += 1;
        self.right_line += 1;
    }

    fn finish(self, ranges: &mut ChangeRanges) {
        ranges.left.extend(self.left.finish());
        ranges.right.extend(self.right.finish());
    }
}

/// Coalesces increasing line numbers into contiguous runs.
#[derive(Default)]
struct RunBuilder {
    runs: Vec<ChangeRange>,
}

impl RunBuilder {
    fn record(&mut self, line: u32) {
        match self.runs.last_mut() {
            Some(run) if line == run.end + 1 => run.end = line,
            _ => self.runs.push(ChangeRange::new(line, line)),
        }
    }

    fn finish(self) -> Vec<ChangeRange> {
        self.runs
    }
}

// ============================================================================
// Tests
// ============================================================================
