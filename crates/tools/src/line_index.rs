//! Byte offset to line/column lookup for error pointing.

/// 1-based line, 0-based byte column within the line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineCol {
    pub line: usize,
    pub column: usize,
}

/// Precomputed line starts of a source text.
///
/// Invariant: `line_starts[0] == 0` and the offsets are strictly increasing.
#[derive(Clone, Debug)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(memchr::memchr_iter(b'\n', source.as_bytes()).map(|i| i + 1));
        Self {
            line_starts,
            len: source.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Offsets past the end of the source clamp to the last position.
    pub fn line_col(&self, offset: usize) -> LineCol {
        let offset = offset.min(self.len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        LineCol {
            line: line + 1,
            column: offset - self.line_starts[line],
        }
    }

    /// Byte range of the 1-based `line`, excluding its line terminator.
    pub fn line_range(&self, source: &str, line: usize) -> Option<(usize, usize)> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let mut end = self
            .line_starts
            .get(line)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        if end > start && source.as_bytes()[end - 1] == b'\r' {
            end -= 1;
        }
        Some((start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_offsets_to_lines_and_columns() {
        let source = "ab\ncd\n\nef";
        let index = LineIndex::new(source);
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.line_col(0), LineCol { line: 1, column: 0 });
        assert_eq!(index.line_col(2), LineCol { line: 1, column: 2 });
        assert_eq!(index.line_col(3), LineCol { line: 2, column: 0 });
        assert_eq!(index.line_col(6), LineCol { line: 3, column: 0 });
        assert_eq!(index.line_col(8), LineCol { line: 4, column: 1 });
        assert_eq!(index.line_col(100), LineCol { line: 4, column: 2 });
    }

    #[test]
    fn line_range_excludes_terminators() {
        let source = "one\r\ntwo\nthree";
        let index = LineIndex::new(source);
        let (s, e) = index.line_range(source, 1).unwrap();
        assert_eq!(&source[s..e], "one");
        let (s, e) = index.line_range(source, 2).unwrap();
        assert_eq!(&source[s..e], "two");
        let (s, e) = index.line_range(source, 3).unwrap();
        assert_eq!(&source[s..e], "three");
        assert!(index.line_range(source, 4).is_none());
        assert!(index.line_range(source, 0).is_none());
    }
}
