//! Paragraph-boundary text chunker with overlap.
//!
//! Splits extracted document text into pieces of at most `max_chars`
//! characters. Splitting prefers paragraph boundaries (`\n\n`), then line and
//! word boundaries inside oversized paragraphs. Consecutive pieces share up to
//! `overlap_chars` characters of trailing context so that a sentence cut at a
//! boundary is still retrievable from either side.
//!
//! Lengths are counted in `char`s; slicing never lands inside a UTF-8
//! sequence.

/// Split text into chunks, respecting `max_chars` and carrying
/// `overlap_chars` of context between neighbours.
///
/// Returns an empty vector for whitespace-only input.
pub fn chunk_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let overlap = overlap_chars.min(max_chars - 1);

    let mut chunks = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        let para_len = char_len(trimmed);

        let would_be = if buf.is_empty() {
            para_len
        } else {
            char_len(&buf) + 2 + para_len // +2 for \n\n separator
        };

        if would_be > max_chars && !buf.is_empty() {
            let tail = overlap_tail(&buf, overlap);
            chunks.push(std::mem::take(&mut buf));
            if !tail.is_empty() && char_len(&tail) + 2 + para_len <= max_chars {
                buf = tail;
            }
        }

        if para_len > max_chars {
            if !buf.is_empty() {
                chunks.push(std::mem::take(&mut buf));
            }
            chunks.extend(hard_split(trimmed, max_chars, overlap));
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(trimmed);
        }
    }

    if !buf.is_empty() {
        chunks.push(buf);
    }

    chunks
}

/// Splits a single oversized paragraph at newline or space boundaries,
/// stepping back by `overlap` characters between pieces.
fn hard_split(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut remaining = text;

    loop {
        if char_len(remaining) <= max_chars {
            let last = remaining.trim();
            if !last.is_empty() {
                pieces.push(last.to_string());
            }
            break;
        }

        let limit = byte_offset(remaining, max_chars);
        let window = &remaining[..limit];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&pos| pos > 0)
            .map(|pos| pos + 1)
            .unwrap_or(limit);

        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }

        let back = tail_start(&remaining[..split_at], overlap);
        let next = if back > 0 && back < split_at {
            back
        } else {
            split_at
        };
        remaining = remaining[next..].trim_start();
    }

    pieces
}

/// Trailing `overlap` characters of `s`, starting on a word boundary.
/// Empty when `s` is not longer than the overlap.
fn overlap_tail(s: &str, overlap: usize) -> String {
    let start = tail_start(s, overlap);
    if start == 0 {
        return String::new();
    }
    s[start..].trim().to_string()
}

/// Byte index where the overlap tail of `s` begins, or 0 when the whole
/// string would be the tail.
fn tail_start(s: &str, overlap: usize) -> usize {
    if overlap == 0 {
        return s.len();
    }
    let len = char_len(s);
    if len <= overlap {
        return 0;
    }
    let start = byte_offset(s, len - overlap);
    let mid_word = !s[..start].ends_with(char::is_whitespace);
    if mid_word {
        if let Some((pos, ws)) = s[start..].char_indices().find(|(_, c)| c.is_whitespace()) {
            return start + pos + ws.len_utf8();
        }
    }
    start
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the `n`th char, or `s.len()` past the end.
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}
