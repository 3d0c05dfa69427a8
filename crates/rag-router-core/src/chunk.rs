//! Paragraph-aware text chunker with overlap.
//!
//! Splits a document body into [`Chunk`]s of at most `chunk_chars`
//! characters. Paragraphs (`\n\n`-separated) are packed together while they
//! fit; when a chunk is flushed, up to `overlap_chars` characters from its
//! tail (snapped to a word boundary) seed the next chunk so that facts
//! spanning a boundary stay retrievable. Paragraphs longer than a whole
//! chunk are cut into overlapping windows at whitespace.
//!
//! Chunk ids are derived from the document id and chunk index, so re-chunking
//! identical input yields identical chunks.
//!
//! ```rust
//! use rag_router_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("doc-1", "Refunds within 30 days.\n\nShipping is free.", 1000, 200);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Default chunk size, in characters.
pub const DEFAULT_CHUNK_CHARS: usize = 1000;
/// Default overlap between consecutive chunks, in characters.
pub const DEFAULT_OVERLAP_CHARS: usize = 200;

/// Split `text` into chunks. Blank text yields no chunks.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    chunk_chars: usize,
    overlap_chars: usize,
) -> Vec<Chunk> {
    let max = chunk_chars.max(1);
    let overlap = overlap_chars.min(max - 1);

    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let para_len = char_len(para);

        if para_len > max {
            if !buf.is_empty() {
                pieces.push(std::mem::take(&mut buf));
            }
            pieces.extend(split_long(para, max, overlap));
            continue;
        }

        let would_be = if buf.is_empty() {
            para_len
        } else {
            char_len(&buf) + 2 + para_len
        };

        if would_be > max {
            let carried = overlap_tail(&buf, overlap).to_string();
            pieces.push(std::mem::take(&mut buf));
            if !carried.is_empty() && char_len(&carried) + 2 + para_len <= max {
                buf = carried;
            }
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(para);
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
        .iter()
        .enumerate()
        .map(|(i, text)| make_chunk(document_id, i as i64, text))
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `n` characters of `s`, advanced to the start of a whole word.
fn overlap_tail(s: &str, n: usize) -> &str {
    if n == 0 || s.is_empty() {
        return "";
    }
    let start = match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => idx,
        None => return s,
    };
    if start == 0 {
        return s;
    }
    let tail = &s[start..];
    match tail.find(char::is_whitespace) {
        Some(ws) => tail[ws..].trim_start(),
        None => "",
    }
}

/// Cut an oversized paragraph into overlapping windows, preferring whitespace cuts.
fn split_long(text: &str, max: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut pieces = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let mut end = (start + max).min(chars.len());
        if end < chars.len() {
            let floor = (start + max / 2).max(start + 1);
            if let Some(ws) = (floor..end).rev().find(|&i| chars[i].1.is_whitespace()) {
                end = ws;
            }
        }

        let from = chars[start].0;
        let to = chars.get(end).map(|(idx, _)| *idx).unwrap_or(text.len());
        let piece = text[from..to].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }

        if end >= chars.len() {
            break;
        }
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    pieces
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let hash = format!("{:x}", Sha256::digest(text.as_bytes()));
    let id = format!(
        "{:x}",
        Sha256::digest(format!("{}:{}", document_id, index).as_bytes())
    );

    Chunk {
        id: id[..32].to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
