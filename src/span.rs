//! Source code location tracking
//!
//! Spans and locations record where tokens and AST nodes came from in the
//! source code. They are essential for error reporting.

use std::fmt;

/// A point in the source code: byte offset plus 1-indexed line and column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    /// Byte offset from the start of the source
    pub offset: usize,
    /// Line number (1-indexed)
    pub line: u32,
    /// Column number (1-indexed, counted in characters)
    pub column: u32,
}

impl Location {
    pub fn new(offset: usize, line: u32, column: u32) -> Self {
        Self { offset, line, column }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self { offset: 0, line: 1, column: 1 }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A span representing a range in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Span {
    /// Start position (byte offset)
    pub start: usize,
    /// End position (byte offset, exclusive)
    pub end: usize,
}

impl Span {
    /// Create a new span
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Get the length of the span
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if the span is empty
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Get the source text for this span
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Maps byte offsets to line/column locations
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset of the first character of every line
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { line_starts }
    }

    /// Number of lines (a trailing newline opens an empty last line)
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte offset where the line containing `offset` begins
    pub fn line_start(&self, offset: usize) -> usize {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };
        self.line_starts[line]
    }

    /// Resolve a byte offset inside `text` to a full location
    pub fn location(&self, text: &str, offset: usize) -> Location {
        let offset = offset.min(text.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };
        let start = self.line_starts[line];
        let column = text
            .get(start..offset)
            .map_or(offset - start, |prefix| prefix.chars().count());

        Location {
            offset,
            line: line as u32 + 1,
            column: column as u32 + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_text() {
        let source = "liI1 ii";
        let span = Span::new(0, 4);
        assert_eq!(span.text(source), "liI1");
        assert_eq!(span.len(), 4);
    }

    #[test]
    fn test_line_index_columns_are_one_based() {
        let source = "li1I\n  l1iI\n";
        let index = LineIndex::new(source);

        assert_eq!(index.location(source, 0), Location::new(0, 1, 1));
        assert_eq!(index.location(source, 7), Location::new(7, 2, 3));
        assert_eq!(index.line_count(), 3);
    }

    #[test]
    fn test_line_start() {
        let source = "ab\ncd\nef";
        let index = LineIndex::new(source);
        assert_eq!(index.line_start(4), 3);
        assert_eq!(index.line_start(3), 3);
        assert_eq!(index.line_start(1), 0);
    }

    #[test]
    fn test_offset_past_end_clamps() {
        let source = "ab";
        let index = LineIndex::new(source);
        assert_eq!(index.location(source, 10), Location::new(2, 1, 3));
    }
}
