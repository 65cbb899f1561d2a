//! Edit IR: Span, Edit, EditSet for single-pass source rewriting.
//!
//! Rewrites are expressed as pure data: a list of byte-range edits derived
//! from an immutable parse of the original buffer. An `EditSet` is validated
//! (in bounds, pairwise non-overlapping, optionally bound to the hash of the
//! buffer it was computed from) and then applied in one pass from the highest
//! offset to the lowest, so no edit ever invalidates another edit's offsets.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Hash type for content verification (SHA-256, stored as hex string for JSON compatibility).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute SHA-256 hash of the given bytes, returning hex-encoded string.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Core Types
// ============================================================================

/// Byte offsets into a source buffer.
///
/// Spans are half-open intervals: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Create a new span.
    ///
    /// # Panics
    /// Panics if `start > end`.
    pub fn new(start: usize, end: usize) -> Self {
        assert!(
            start <= end,
            "Span start ({}) must be <= end ({})",
            start,
            end
        );
        Span { start, end }
    }

    /// Zero-width span at `offset`, used as an insertion point.
    pub fn at(offset: usize) -> Self {
        Span {
            start: offset,
            end: offset,
        }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Check if span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check if this span overlaps with another.
    ///
    /// Two spans overlap if they share any byte positions, or if one is an
    /// insertion point strictly inside the other. Adjacent spans (one ends
    /// where another starts) do NOT overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Check if this span contains another span entirely.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ============================================================================
// Edit Operations
// ============================================================================

/// The kind of edit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditKind {
    /// Insert text at `span.start` (span must be empty).
    Insert,
    /// Delete the bytes in `span` (span must be non-empty).
    Delete,
    /// Replace the bytes in `span` with new text.
    Replace,
}

/// A single text change against the original buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    /// Stable identifier. Among edits sharing an insertion point, lower ids
    /// land earlier in the output.
    pub id: u32,
    /// The kind of operation.
    pub kind: EditKind,
    /// Target range in the original buffer.
    pub span: Span,
    /// The new text (empty for Delete).
    pub text: String,
    /// Optional provenance label (e.g. "prologue", "return-site").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edit {
    /// Create an Insert edit at `offset`.
    pub fn insert(id: u32, offset: usize, text: impl Into<String>) -> Self {
        Edit {
            id,
            kind: EditKind::Insert,
            span: Span::at(offset),
            text: text.into(),
            label: None,
        }
    }

    /// Create a Delete edit.
    pub fn delete(id: u32, span: Span) -> Self {
        Edit {
            id,
            kind: EditKind::Delete,
            span,
            text: String::new(),
            label: None,
        }
    }

    /// Create a Replace edit.
    pub fn replace(id: u32, span: Span, text: impl Into<String>) -> Self {
        Edit {
            id,
            kind: EditKind::Replace,
            span,
            text: text.into(),
            label: None,
        }
    }

    /// Attach a provenance label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Check the span shape against the edit kind.
    fn shape_error(&self) -> Option<&'static str> {
        match self.kind {
            EditKind::Insert if !self.span.is_empty() => Some("insert span must be empty"),
            EditKind::Delete if self.span.is_empty() => Some("delete span must be non-empty"),
            _ => None,
        }
    }
}

// ============================================================================
// Conflict Detection
// ============================================================================

/// A detected problem that prevents an edit set from applying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conflict {
    /// Two edits have overlapping spans.
    OverlappingSpans {
        edit1: u32,
        edit1_span: Span,
        edit2: u32,
        edit2_span: Span,
    },

    /// Span is out of bounds for the buffer.
    SpanOutOfBounds { edit: u32, span: Span, len: usize },

    /// Span shape does not match the edit kind.
    MalformedEdit { edit: u32, reason: String },
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::OverlappingSpans {
                edit1,
                edit1_span,
                edit2,
                edit2_span,
            } => write!(
                f,
                "edit {} {} overlaps edit {} {}",
                edit1, edit1_span, edit2, edit2_span
            ),
            Conflict::SpanOutOfBounds { edit, span, len } => {
                write!(f, "edit {} span {} exceeds buffer length {}", edit, span, len)
            }
            Conflict::MalformedEdit { edit, reason } => write!(f, "edit {}: {}", edit, reason),
        }
    }
}

/// Errors from validating or applying an `EditSet`.
#[derive(Debug, Error)]
pub enum EditError {
    /// One or more conflicts were detected; nothing was applied.
    #[error("{} conflicting edit(s), first: {}", .0.len(), .0.first().map(|c| c.to_string()).unwrap_or_default())]
    Conflicts(Vec<Conflict>),

    /// The buffer differs from the one the edits were computed against.
    #[error("content hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
}

// ============================================================================
// EditSet
// ============================================================================

/// An ordered set of edits against one buffer, applied atomically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditSet {
    /// Hash of the buffer the edits were derived from, if bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_hash: Option<ContentHash>,
    /// The edits, in insertion order until `sort_edits` is called.
    pub edits: Vec<Edit>,
}

impl EditSet {
    /// Create an empty, unbound edit set.
    pub fn new() -> Self {
        EditSet::default()
    }

    /// Create an edit set bound to the given buffer's hash.
    pub fn for_content(content: &[u8]) -> Self {
        EditSet {
            base_hash: Some(ContentHash::compute(content)),
            edits: Vec::new(),
        }
    }

    /// Add an edit.
    pub fn with_edit(mut self, edit: Edit) -> Self {
        self.edits.push(edit);
        self
    }

    /// Add an edit in place.
    pub fn push(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    /// Next unused edit id.
    pub fn next_id(&self) -> u32 {
        self.edits.iter().map(|e| e.id + 1).max().unwrap_or(0)
    }

    /// Check if this set contains any edits.
    pub fn has_edits(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Number of edits.
    pub fn edit_count(&self) -> usize {
        self.edits.len()
    }

    /// Sort edits in deterministic order: by span start, then span end, then id.
    pub fn sort_edits(&mut self) {
        self.edits
            .sort_by(|a, b| (a.span.start, a.span.end, a.id).cmp(&(b.span.start, b.span.end, b.id)));
    }

    /// Detect conflicts within this set against a buffer of length `len`.
    ///
    /// Returns a list of all detected conflicts. An empty list means the set
    /// can be applied.
    #[must_use]
    pub fn detect_conflicts(&self, len: usize) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        for edit in &self.edits {
            if let Some(reason) = edit.shape_error() {
                conflicts.push(Conflict::MalformedEdit {
                    edit: edit.id,
                    reason: reason.to_string(),
                });
            }
            if edit.span.end > len || edit.span.start > edit.span.end {
                conflicts.push(Conflict::SpanOutOfBounds {
                    edit: edit.id,
                    span: edit.span,
                    len,
                });
            }
        }

        for i in 0..self.edits.len() {
            for j in (i + 1)..self.edits.len() {
                let a = &self.edits[i];
                let b = &self.edits[j];
                if a.span.overlaps(&b.span) {
                    conflicts.push(Conflict::OverlappingSpans {
                        edit1: a.id,
                        edit1_span: a.span,
                        edit2: b.id,
                        edit2_span: b.span,
                    });
                }
            }
        }

        conflicts
    }

    /// Validate this set against `content` without applying it.
    pub fn validate(&self, content: &[u8]) -> Result<(), EditError> {
        if let Some(expected) = &self.base_hash {
            let actual = ContentHash::compute(content);
            if &actual != expected {
                return Err(EditError::HashMismatch {
                    expected: expected.0.clone(),
                    actual: actual.0,
                });
            }
        }

        let conflicts = self.detect_conflicts(content.len());
        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(EditError::Conflicts(conflicts))
        }
    }

    /// Apply this set to `content`, producing the rewritten buffer.
    ///
    /// Either every edit applies or none does. Edits are applied from the
    /// highest offset to the lowest. At a shared start offset a non-empty
    /// replacement is applied before zero-width inserts, so inserted text
    /// lands in front of the replaced range.
    pub fn apply(&self, content: &[u8]) -> Result<Vec<u8>, EditError> {
        self.validate(content)?;

        let mut ordered: Vec<&Edit> = self.edits.iter().collect();
        ordered.sort_by(|a, b| {
            (b.span.start, b.span.end, b.id).cmp(&(a.span.start, a.span.end, a.id))
        });

        let mut out = content.to_vec();
        for edit in ordered {
            let range = edit.span.start..edit.span.end;
            match edit.kind {
                EditKind::Insert | EditKind::Replace => {
                    out.splice(range, edit.text.bytes());
                }
                EditKind::Delete => {
                    out.drain(range);
                }
            }
        }

        Ok(out)
    }
}

// ============================================================================
// Tests
// ============================================================================
