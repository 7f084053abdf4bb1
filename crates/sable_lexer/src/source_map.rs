//! Mapping byte offsets back to human-readable source positions.

use crate::Span;

/// Resolves byte offsets to 1-based line/column pairs and raw line text.
///
/// Built once per compilation unit from the file name and source text; every
/// diagnostic in the pipeline goes through it to produce
/// `file:line:column: message` with the offending line attached.
#[derive(Clone, Debug)]
pub struct SourceMap {
    file: String,
    source: String,
    /// Byte offset of the start of each line.
    line_starts: Vec<u32>,
}

impl SourceMap {
    /// Builds a source map for the given file name and source text.
    pub fn new(file: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let mut line_starts = vec![0u32];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        Self {
            file: file.into(),
            source,
            line_starts,
        }
    }

    /// Returns the file name this map was built from.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Returns the full source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Resolves a byte offset to a 1-based (line, column) pair.
    ///
    /// Columns count characters, not bytes, and reset at each newline.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = self.line_starts[line_idx] as usize;
        let offset = (offset as usize).min(self.source.len());
        let column = self.source[line_start..offset].chars().count() as u32 + 1;
        (line_idx as u32 + 1, column)
    }

    /// Returns the raw text of a 1-based line, without its trailing newline.
    pub fn line_text(&self, line: u32) -> &str {
        let idx = (line as usize).saturating_sub(1);
        let start = match self.line_starts.get(idx) {
            Some(&s) => s as usize,
            None => return "",
        };
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&e| e as usize)
            .unwrap_or(self.source.len());
        self.source[start..end].trim_end_matches(['\n', '\r'])
    }

    /// Returns the source text covered by a span.
    pub fn span_text(&self, span: Span) -> &str {
        &self.source[span.start as usize..span.end as usize]
    }

    /// Renders a diagnostic for a span: location, message, and the raw line
    /// with a caret under the offending column.
    pub fn render(&self, span: Span, message: &str) -> String {
        let (line, col) = self.line_col(span.start);
        let text = self.line_text(line);
        let mut out = format!("{}:{}:{}: {}", self.file, line, col, message);
        if !text.is_empty() {
            out.push('\n');
            out.push_str("  ");
            out.push_str(text);
            out.push('\n');
            out.push_str("  ");
            for _ in 1..col {
                out.push(' ');
            }
            out.push('^');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col() {
        let map = SourceMap::new("test.sb", "ab\ncd\nef");
        assert_eq!(map.line_col(0), (1, 1));
        assert_eq!(map.line_col(1), (1, 2));
        assert_eq!(map.line_col(3), (2, 1));
        assert_eq!(map.line_col(7), (3, 2));
    }

    #[test]
    fn test_line_text() {
        let map = SourceMap::new("test.sb", "first\nsecond\nthird");
        assert_eq!(map.line_text(1), "first");
        assert_eq!(map.line_text(2), "second");
        assert_eq!(map.line_text(3), "third");
        assert_eq!(map.line_text(4), "");
    }

    #[test]
    fn test_render_includes_location_and_caret() {
        let map = SourceMap::new("test.sb", "val x = @");
        let rendered = map.render(Span::point(8), "unexpected character '@'");
        assert!(rendered.starts_with("test.sb:1:9: unexpected character '@'"));
        assert!(rendered.contains("val x = @"));
        assert!(rendered.ends_with("        ^"));
    }

    #[test]
    fn test_column_counts_chars_after_newline() {
        let map = SourceMap::new("test.sb", "x\nyy\nzzz");
        assert_eq!(map.line_col(4), (2, 3));
    }
}
