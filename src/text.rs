//! Byte-offset line boundary helpers over UTF-8 text.
//!
//! Lines include their terminating newline; the last line may be
//! unterminated. All offsets are byte offsets, and since `\n` is ASCII every
//! boundary returned here is also a character boundary.

use std::ops::Range;

/// End of the line containing `at`: one past the terminating `\n`, or the
/// end of the text for an unterminated last line.
pub(crate) fn line_end(text: &str, at: usize) -> usize {
    let bytes = text.as_bytes();
    if at >= bytes.len() {
        return bytes.len();
    }
    match bytes[at..].iter().position(|&b| b == b'\n') {
        Some(i) => at + i + 1,
        None => bytes.len(),
    }
}

/// Splits `range` into per-line sub-ranges. The first sub-range is clipped to
/// `range.start` and the last to `range.end`.
pub(crate) fn lines(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = range.start;
    while start < range.end {
        let end = line_end(text, start).min(range.end);
        out.push(start..end);
        start = end;
    }
    out
}

/// First character boundary at or after `at`.
pub(crate) fn ceil_char_boundary(text: &str, at: usize) -> usize {
    let bytes = text.as_bytes();
    let mut at = at.min(bytes.len());
    while at < bytes.len() && (bytes[at] & 0xC0) == 0x80 {
        at += 1;
    }
    at
}
