//! Text normalization and overlapping chunking.
//!
//! Chunks are measured in characters. Boundaries repeat `overlap`
//! characters from the previous chunk so retrieval keeps cross-boundary
//! context. Concatenating a document's chunks in ordinal order, minus
//! the overlap regions, reconstructs the normalized source exactly, so
//! chunk windows are never trimmed to sentence boundaries here.

use serde::{Deserialize, Serialize};

/// A contiguous span of normalized document text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSpan {
    /// Position within the document's chunk sequence.
    pub ordinal: usize,
    pub text: String,
    /// Char offset of the span start in the normalized text.
    pub start: usize,
    /// Char offset one past the span end.
    pub end: usize,
}

/// Normalize raw document text before chunking.
///
/// Line endings are unified, control characters other than newlines are
/// dropped, horizontal whitespace runs collapse to a single space, and
/// blank-line runs collapse to one blank line.
pub fn normalize(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut pending_space = false;
    let mut newline_run = 0usize;

    for c in unified.chars() {
        match c {
            '\n' => {
                pending_space = false;
                newline_run += 1;
                if newline_run <= 2 {
                    out.push('\n');
                }
            }
            c if c.is_control() => {}
            c if c.is_whitespace() => {
                pending_space = true;
            }
            c => {
                if pending_space && !out.is_empty() && !out.ends_with('\n') {
                    out.push(' ');
                }
                pending_space = false;
                newline_run = 0;
                out.push(c);
            }
        }
    }

    out.trim_matches('\n').trim().to_string()
}

/// Split normalized text into overlapping character windows.
///
/// Empty or whitespace-only input yields no chunks; input no longer
/// than `max_chunk_size` yields exactly one chunk without overlap.
/// Callers must keep `overlap < max_chunk_size`.
pub fn chunk(normalized: &str, max_chunk_size: usize, overlap: usize) -> Vec<ChunkSpan> {
    debug_assert!(overlap < max_chunk_size);

    let chars: Vec<char> = normalized.chars().collect();
    let total = chars.len();
    if total == 0 {
        return Vec::new();
    }

    let step = max_chunk_size - overlap;
    let mut spans = Vec::new();
    let mut start = 0;
    let mut ordinal = 0;

    loop {
        let end = (start + max_chunk_size).min(total);
        spans.push(ChunkSpan {
            ordinal,
            text: chars[start..end].iter().collect(),
            start,
            end,
        });

        if end == total {
            break;
        }
        start += step;
        ordinal += 1;
    }

    spans
}
