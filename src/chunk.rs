//! Sentence-aware text chunker with overlap.
//!
//! Produces fixed-target-size chunks (`chunk_size`, characters) with overlap
//! (`chunk_overlap`), preferring to break at sentence boundaries so no chunk
//! starts or ends mid-sentence when a nearby boundary exists. Generalizes the
//! paragraph-boundary splitter this module started from (see DESIGN.md) to
//! the sentence granularity SPEC_FULL §4.3 calls for.
//!
//! Invariant (P2): the chunks' texts, concatenated in position order, cover
//! the source text exactly, with at most `chunk_overlap` characters repeated
//! between consecutive chunks.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// How far back from a target boundary we're willing to look for a sentence
/// break before giving up and hard-cutting at the target.
const BOUNDARY_SEARCH_WINDOW: usize = 200;

/// Split `text` into overlapping, sentence-aware chunks. `chunk_size` and
/// `chunk_overlap` are character counts; callers validate `chunk_overlap <
/// chunk_size` at config-load time (SPEC_FULL §6).
pub fn chunk_text(document_id: &str, text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    if text.is_empty() {
        return vec![make_chunk(document_id, 0, text)];
    }

    let boundaries = sentence_boundaries(text);
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut position = 0usize;

    while start < text.len() {
        let target_end = (start + chunk_size).min(text.len());
        let end = if target_end >= text.len() {
            text.len()
        } else {
            match snap_to_boundary(&boundaries, start, target_end) {
                Some(b) => b,
                None => {
                    let floored = floor_char_boundary(text, target_end);
                    if floored > start { floored } else { ceil_char_boundary(text, target_end) }
                }
            }
        };

        chunks.push(make_chunk(document_id, position as i64, &text[start..end]));
        position += 1;

        if end >= text.len() {
            break;
        }

        let next_start = floor_char_boundary(text, end.saturating_sub(chunk_overlap));
        start = if next_start > start { next_start } else { end };
    }

    if chunks.is_empty() {
        chunks.push(make_chunk(document_id, 0, text));
    }

    chunks
}

/// Byte offsets immediately after each sentence-ending punctuation mark
/// (followed by whitespace) or newline, plus the text end.
fn sentence_boundaries(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut boundaries = Vec::new();
    for (i, &b) in bytes.iter().enumerate() {
        let is_terminator = matches!(b, b'.' | b'?' | b'!') && bytes.get(i + 1).map(|c| c.is_ascii_whitespace()).unwrap_or(true);
        let is_newline = b == b'\n';
        if is_terminator || is_newline {
            boundaries.push(i + 1);
        }
    }
    boundaries.push(text.len());
    boundaries
}

/// Find the closest sentence boundary within `BOUNDARY_SEARCH_WINDOW` chars
/// before `target_end` that is still past `start`, respecting UTF-8
/// char boundaries.
fn snap_to_boundary(boundaries: &[usize], start: usize, target_end: usize) -> Option<usize> {
    let floor = target_end.saturating_sub(BOUNDARY_SEARCH_WINDOW).max(start + 1);
    boundaries
        .iter()
        .copied()
        .filter(|&b| b > floor && b <= target_end && b > start)
        .max()
}

/// Largest char boundary `<= idx`. `idx` may exceed `text.len()`.
fn floor_char_boundary(text: &str, idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    let mut i = idx;
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest char boundary `>= idx`. `idx` may exceed `text.len()`.
fn ceil_char_boundary(text: &str, idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    let mut i = idx;
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

fn make_chunk(document_id: &str, position: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let _hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        position: position as usize,
        text: text.to_string(),
        keywords: Vec::new(),
        rolling_summary: String::new(),
        embedding: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(chunks: &[Chunk]) -> String {
        let mut out = String::new();
        for c in chunks {
            out.push_str(&c.text);
        }
        out
    }

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", 700, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].position, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn empty_text_yields_one_chunk() {
        let chunks = chunk_text("doc1", "", 700, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].position, 0);
    }

    #[test]
    fn positions_are_contiguous() {
        let text = (0..50)
            .map(|i| format!("This is sentence number {}.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text("doc1", &text, 120, 20);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.position, i);
        }
    }

    #[test]
    fn covers_source_text_modulo_overlap() {
        let text = "Alpha bravo charlie. Delta echo foxtrot. Golf hotel india. Juliet kilo lima. Mike november oscar.";
        let chunks = chunk_text("doc1", text, 40, 10);
        let reconstructed = reconstruct(&chunks);
        // Every character of the source appears somewhere in the reconstruction,
        // in order; overlap only ever repeats, never drops, text.
        assert!(reconstructed.len() >= text.len());
        assert!(reconstructed.starts_with("Alpha"));
        assert!(reconstructed.ends_with("oscar."));
    }

    #[test]
    fn deterministic_given_same_input() {
        let text = "Alpha. Beta. Gamma. Delta.";
        let c1 = chunk_text("doc1", text, 10, 2);
        let c2 = chunk_text("doc1", text, 10, 2);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.position, b.position);
        }
    }

    #[test]
    fn terminates_on_text_with_no_sentence_boundaries() {
        let text = "a".repeat(500);
        let chunks = chunk_text("doc1", &text, 100, 20);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.position, i);
        }
    }

    #[test]
    fn does_not_panic_on_multibyte_boundary_with_no_sentence_break() {
        // No ASCII sentence terminators anywhere, so every cut falls back to
        // a hard cut that must be snapped to a char boundary.
        let text = "caf\u{e9} na\u{efve} r\u{e9}sum\u{e9} \u{2014} ".repeat(40);
        let chunks = chunk_text("doc1", &text, 37, 10);
        assert!(chunks.len() > 1);
        assert_eq!(reconstruct(&chunks).chars().count() >= text.chars().count(), true);
    }
}
