//! Semantic-aware text chunker for material ingestion.
//!
//! Splits cleaned material text into overlapping segments by recursively
//! trying a preference-ordered list of separators (paragraph break, line
//! break, sentence end, whitespace, character) until every fragment fits
//! the target size. Each chunk carries the most recently detected chapter
//! heading and a byte-offset range where `end_offset(i) - overlap` seeds
//! `start_offset(i+1)`.
//!
//! Chunk boundaries are deterministic: identical input and parameters
//! always produce identical output.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};

/// Separator preference order, most semantic first. The empty separator
/// means hard character windows.
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// A chunk produced by the splitter, before embedding and insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub chunk_index: i64,
    pub text: String,
    pub chapter: Option<String>,
    pub start_offset: i64,
    pub end_offset: i64,
}

fn chapter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // "chapter" plus Vietnamese equivalents, optional roman or arabic
        // numbering, then the heading title. Cleaned text is newline-free,
        // so the title is bounded at the first sentence end.
        Regex::new(
            r"(?im)^\s*(?:chương|chuong|chapter)[\s.:;\-–—_]*(?:[ivxlcdm]+|\d+(?:[.,]\d+)?)?[\s.:;\-–—_]*[^\n.]*\.?",
        )
        .expect("chapter regex is valid")
    })
}

/// Detect a chapter/section heading at the start of `text`.
pub fn detect_chapter(text: &str) -> Option<String> {
    chapter_regex()
        .find(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Strip non-printable control characters, map line breaks and tabs to
/// spaces, and collapse whitespace runs to single spaces.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true; // leading whitespace is dropped
    for ch in text.chars() {
        let mapped = if ch == '\n' || ch == '\r' || ch == '\t' {
            Some(' ')
        } else if ch.is_control() || matches!(ch, '\u{200B}' | '\u{FEFF}') {
            None
        } else {
            Some(ch)
        };
        if let Some(c) = mapped {
            if c.is_whitespace() {
                if !last_was_space {
                    out.push(' ');
                }
                last_was_space = true;
            } else {
                out.push(c);
                last_was_space = false;
            }
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Chunk a material's raw text.
///
/// Cleans the text first and fails with [`Error::EmptyOrUnreadableSource`]
/// when fewer than `min_text_len` usable characters remain, rather than
/// producing degenerate chunks.
pub fn chunk_material(text: &str, params: &ChunkingConfig) -> Result<Vec<ChunkDraft>> {
    let cleaned = clean_text(text);
    if cleaned.chars().count() < params.min_text_len {
        return Err(Error::EmptyOrUnreadableSource(format!(
            "{} usable characters after cleaning (minimum {})",
            cleaned.chars().count(),
            params.min_text_len
        )));
    }

    let pieces = split_text(&cleaned, params.chunk_size, params.chunk_overlap);

    let mut drafts = Vec::with_capacity(pieces.len());
    let mut current_offset: i64 = 0;
    let mut current_chapter: Option<String> = None;

    for (i, piece) in pieces.into_iter().enumerate() {
        if let Some(chapter) = detect_chapter(&piece) {
            current_chapter = Some(chapter);
        }

        let len = piece.chars().count() as i64;
        let start_offset = current_offset;
        let end_offset = start_offset + len;

        drafts.push(ChunkDraft {
            chunk_index: i as i64,
            text: piece,
            chapter: current_chapter.clone(),
            start_offset,
            end_offset,
        });

        // Heuristic: the next chunk repeats up to `overlap` trailing
        // characters of this one, so its start is seeded before this end.
        current_offset = (end_offset - params.chunk_overlap as i64).max(start_offset);
    }

    Ok(drafts)
}

/// Recursively split `text` into fragments of at most `chunk_size`
/// characters, preferring the most semantic separator that occurs.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    split_with(text, &SEPARATORS, chunk_size, overlap)
}

fn split_with(text: &str, separators: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    // Pick the first separator present in the text; the empty separator
    // always matches and means fixed character windows.
    let mut sep_idx = separators.len() - 1;
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() || text.contains(sep) {
            sep_idx = i;
            break;
        }
    }
    let sep = separators[sep_idx];
    let remaining = &separators[sep_idx + 1..];

    if sep.is_empty() {
        return window_split(text, chunk_size, overlap);
    }

    let splits = split_keep_separator(text, sep);

    let mut finals: Vec<String> = Vec::new();
    let mut good: Vec<String> = Vec::new();

    for piece in splits {
        if piece.chars().count() <= chunk_size {
            good.push(piece);
        } else {
            if !good.is_empty() {
                finals.extend(merge_splits(&good, chunk_size, overlap));
                good.clear();
            }
            finals.extend(split_with(&piece, remaining, chunk_size, overlap));
        }
    }
    if !good.is_empty() {
        finals.extend(merge_splits(&good, chunk_size, overlap));
    }

    finals.retain(|s| !s.trim().is_empty());
    finals
}

/// Split on `sep`, keeping the separator attached to the preceding piece
/// so no characters are lost.
fn split_keep_separator(text: &str, sep: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(sep) {
        let end = pos + sep.len();
        pieces.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Greedily merge small pieces into chunks of at most `chunk_size`
/// characters. When a chunk is flushed, trailing pieces totaling at most
/// `overlap` characters seed the next chunk.
fn merge_splits(pieces: &[String], chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut window: Vec<&String> = Vec::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = piece.chars().count();
        if total + len > chunk_size && !window.is_empty() {
            let joined: String = window.iter().map(|s| s.as_str()).collect();
            if !joined.trim().is_empty() {
                chunks.push(joined);
            }
            // Shrink the window to the overlap budget, and further if the
            // incoming piece would still not fit.
            while total > overlap || (total + len > chunk_size && total > 0) {
                let dropped = window.remove(0);
                total -= dropped.chars().count();
            }
        }
        window.push(piece);
        total += len;
    }

    if !window.is_empty() {
        let joined: String = window.iter().map(|s| s.as_str()).collect();
        if !joined.trim().is_empty() {
            chunks.push(joined);
        }
    }

    chunks
}

/// Fixed-size character windows with `overlap` characters repeated between
/// consecutive windows. Last resort when no separator fits.
fn window_split(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut out = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + chunk_size).min(chars.len());
        out.push(chars[start..end].iter().collect::<String>());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    out
}
