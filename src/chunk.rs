//! Separator-priority text chunker with overlap.
//!
//! Splits a patient document into [`ChunkRecord`]s that respect a
//! configurable byte budget. Splitting walks a priority list of
//! separators — paragraph break, line break, space, sentence end — so
//! that chunk boundaries land on semantic seams whenever possible, and
//! neighbouring chunks share a configurable overlap so that evidence
//! straddling a boundary is retrievable from either side.
//!
//! Each chunk receives a v4 UUID, a SHA-256 hash of its text, and the
//! ingestion timestamp.
//!
//! # Algorithm
//!
//! 1. Pick the first separator in the priority list that occurs in the
//!    text; split on it.
//! 2. Fragments within the size budget accumulate and are merged back
//!    with the same separator, flushing a chunk whenever the next
//!    fragment would overflow the budget.
//! 3. On flush, trailing fragments up to `chunk_overlap` bytes are
//!    carried into the next chunk.
//! 4. An oversized fragment recurses with the remaining separators;
//!    once the list is exhausted it is hard-split at UTF-8 boundaries.
//! 5. At least one chunk is produced per document (even for empty text).

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::models::ChunkRecord;

/// Separator priority: paragraph break, line break, space, sentence end.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ". "];

/// Split `text` into chunks of at most `chunk_size` bytes with
/// `chunk_overlap` bytes of carry-over between consecutive chunks.
///
/// # Guarantees
///
/// - At least one chunk is always returned (even for empty text).
/// - Chunk indices are contiguous: `0, 1, 2, …, N-1`.
/// - Chunk text is deterministic for identical input.
/// - Splits never land inside a UTF-8 code point.
pub fn chunk_text(
    source: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<ChunkRecord> {
    let uploaded_at = Utc::now().timestamp();
    let text = text.trim();

    if text.is_empty() {
        return vec![make_chunk(source, 0, text, uploaded_at)];
    }

    let pieces = split_text(text, &SEPARATORS, chunk_size, chunk_overlap);

    let mut chunks: Vec<ChunkRecord> = pieces
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .enumerate()
        .map(|(i, p)| make_chunk(source, i as i64, p, uploaded_at))
        .collect();

    if chunks.is_empty() {
        chunks.push(make_chunk(source, 0, text, uploaded_at));
    }

    chunks
}

/// Pick the first separator present in `text`; the remaining list is
/// everything after it in priority order.
fn pick_separator<'a>(text: &str, separators: &'a [&'a str]) -> (Option<&'a str>, &'a [&'a str]) {
    for (i, sep) in separators.iter().enumerate() {
        if text.contains(sep) {
            return (Some(sep), &separators[i + 1..]);
        }
    }
    (None, &[])
}

fn split_text(text: &str, separators: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    let (sep, rest) = pick_separator(text, separators);
    let sep = match sep {
        Some(s) => s,
        None => return hard_split(text, chunk_size),
    };

    let splits: Vec<&str> = text.split(sep).filter(|s| !s.is_empty()).collect();

    let mut out: Vec<String> = Vec::new();
    let mut good: Vec<&str> = Vec::new();

    for piece in splits {
        if piece.len() <= chunk_size {
            good.push(piece);
        } else {
            if !good.is_empty() {
                out.extend(merge_splits(&good, sep, chunk_size, overlap));
                good.clear();
            }
            if rest.is_empty() {
                out.extend(hard_split(piece, chunk_size));
            } else {
                out.extend(split_text(piece, rest, chunk_size, overlap));
            }
        }
    }

    if !good.is_empty() {
        out.extend(merge_splits(&good, sep, chunk_size, overlap));
    }

    out
}

/// Merge fragments back together with `sep`, flushing whenever the next
/// fragment would overflow `chunk_size` and carrying trailing fragments
/// up to `overlap` bytes into the next chunk.
fn merge_splits(splits: &[&str], sep: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let sep_len = sep.len();
    let mut docs: Vec<String> = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for piece in splits {
        let len = piece.len();
        let join_len = if current.is_empty() { 0 } else { sep_len };

        if total + len + join_len > chunk_size && !current.is_empty() {
            let doc = current.iter().copied().collect::<Vec<_>>().join(sep);
            if !doc.trim().is_empty() {
                docs.push(doc);
            }
            // Drop fragments from the front until the carry-over fits both
            // the overlap budget and the room the incoming fragment needs.
            while total > overlap
                || (total + len + if current.is_empty() { 0 } else { sep_len } > chunk_size
                    && total > 0)
            {
                let extra = if current.len() > 1 { sep_len } else { 0 };
                match current.pop_front() {
                    Some(front) => total -= front.len() + extra,
                    None => break,
                }
            }
        }

        current.push_back(piece);
        total += len + if current.len() > 1 { sep_len } else { 0 };
    }

    let doc = current.iter().copied().collect::<Vec<_>>().join(sep);
    if !doc.trim().is_empty() {
        docs.push(doc);
    }

    docs
}

/// Last-resort split at the size budget, snapped to UTF-8 boundaries.
fn hard_split(text: &str, chunk_size: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= chunk_size {
            out.push(remaining.to_string());
            break;
        }
        let mut split_at = snap_to_char_boundary(remaining, chunk_size);
        if split_at == 0 {
            // Budget smaller than one code point; take a single char.
            split_at = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
        }
        out.push(remaining[..split_at].to_string());
        remaining = &remaining[split_at..];
    }

    out
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Create a single [`ChunkRecord`] with a UUID and SHA-256 content hash.
fn make_chunk(source: &str, index: i64, text: &str, uploaded_at: i64) -> ChunkRecord {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    ChunkRecord {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
        uploaded_at,
    }
}
