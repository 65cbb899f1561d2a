//! Byte-buffer helpers shared by the indexer and the instrumenter.
//!
//! Offsets are 0-indexed bytes; line counts follow diff hunk numbering.

use crate::patch::Span;

/// Extract the bytes covered by a span, or `None` if out of bounds.
pub fn extract_span<'a>(content: &'a [u8], span: &Span) -> Option<&'a [u8]> {
    if span.end <= content.len() && span.start <= span.end {
        Some(&content[span.start..span.end])
    } else {
        None
    }
}

/// Count lines in content. A trailing newline does not start a new line.
pub fn line_count(content: &[u8]) -> u32 {
    if content.is_empty() {
        return 0;
    }
    let newlines = content.iter().filter(|&&b| b == b'\n').count() as u32;
    if content.ends_with(b"\n") {
        newlines
    } else {
        newlines + 1
    }
}

/// Bytes immediately preceding `offset`, at most `window` long and never
/// reaching back past `floor`.
pub fn lookback(content: &[u8], offset: usize, window: usize, floor: usize) -> &[u8] {
    let end = offset.min(content.len());
    let start = end.saturating_sub(window).max(floor.min(end));
    &content[start..end]
}

// ============================================================================
// Tests
// ============================================================================
