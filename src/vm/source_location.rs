//! Source location utilities
//!
//! The runtime works on raw byte offsets. These helpers turn an offset (for
//! example the furthest position a failed parse reached) into a line and
//! column for diagnostics.

use memchr::{memchr_iter, memrchr};
use std::fmt;

/// A position in the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    /// Byte offset from start of input
    pub offset: usize,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based, counted in UTF-8 characters)
    pub column: usize,
}

impl SourcePosition {
    /// Create a new source position
    #[inline]
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    /// Create a position at the start of input
    #[inline]
    pub fn start() -> Self {
        Self::new(0, 1, 1)
    }

    /// Calculate position from a byte offset; offsets past the end are clamped
    pub fn from_offset(input: &[u8], offset: usize) -> Self {
        let offset = offset.min(input.len());
        let before = &input[..offset];

        let line = 1 + memchr_iter(b'\n', before).count();
        let line_start = memrchr(b'\n', before).map_or(0, |i| i + 1);
        let column = 1 + count_chars(&before[line_start..]);

        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

impl Default for SourcePosition {
    fn default() -> Self {
        Self::start()
    }
}

/// Count UTF-8 characters by skipping continuation bytes
#[inline]
fn count_chars(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| (b & 0xC0) != 0x80).count()
}

/// Get the line containing `offset`, without its newline
pub fn line_at_offset(input: &[u8], offset: usize) -> &[u8] {
    let offset = offset.min(input.len());
    let line_start = memrchr(b'\n', &input[..offset]).map_or(0, |i| i + 1);
    let line_end = memchr::memchr(b'\n', &input[offset..]).map_or(input.len(), |i| offset + i);
    &input[line_start..line_end]
}

/// Render the line containing `offset` with a caret under the offset
pub fn render_caret(input: &[u8], offset: usize) -> String {
    let pos = SourcePosition::from_offset(input, offset);
    let line = String::from_utf8_lossy(line_at_offset(input, offset));
    format!("{}\n{}^", line, " ".repeat(pos.column - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_offset_start() {
        let pos = SourcePosition::from_offset(b"hello world", 0);
        assert_eq!(pos, SourcePosition::start());
    }

    #[test]
    fn test_from_offset_newline() {
        let input = b"hello\nworld";
        let pos = SourcePosition::from_offset(input, 6);
        assert_eq!((pos.line, pos.column), (2, 1));
        let pos = SourcePosition::from_offset(input, 8);
        assert_eq!((pos.line, pos.column), (2, 3));
    }

    #[test]
    fn test_from_offset_multibyte() {
        let input = "a世界b".as_bytes();
        // 'b' sits after two 3-byte characters
        let pos = SourcePosition::from_offset(input, 7);
        assert_eq!(pos.column, 4);
    }

    #[test]
    fn test_from_offset_beyond_end() {
        let pos = SourcePosition::from_offset(b"hello", 100);
        assert_eq!(pos.offset, 5);
        assert_eq!(pos.column, 6);
    }

    #[test]
    fn test_line_at_offset() {
        let input = b"line1\nline2\nline3";
        assert_eq!(line_at_offset(input, 0), b"line1");
        assert_eq!(line_at_offset(input, 5), b"line1");
        assert_eq!(line_at_offset(input, 6), b"line2");
        assert_eq!(line_at_offset(input, 12), b"line3");
    }

    #[test]
    fn test_render_caret() {
        assert_eq!(render_caret(b"ab\ncdef", 5), "cdef\n  ^");
    }

    #[test]
    fn test_display() {
        assert_eq!(SourcePosition::new(10, 3, 5).to_string(), "line 3, column 5");
    }
}
