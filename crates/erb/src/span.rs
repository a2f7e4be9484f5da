//! Byte spans into the template source.

/// Byte span into the template source.
///
/// Invariant: `start <= end` and both ends fall on UTF-8 character boundaries
/// of the source the span was produced from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start must be <= end");
        Self { start, end }
    }

    pub fn is_empty(self) -> bool {
        self.start == self.end
    }

    pub fn len(self) -> usize {
        self.end - self.start
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Resolve the span against the source it was produced from.
    pub fn slice(self, source: &str) -> &str {
        &source[self.start..self.end]
    }
}
