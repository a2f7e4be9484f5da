//! Template marker scanner.
//!
//! Splits a template into literal text and markers before any markup scanning.
//! Marker syntax follows Erubi as used by Rails:
//! `<%= %>` output, `<%== %>` raw output, `<% %>` statement, `<%# %>` comment,
//! `<%%` literal `<%`, and `-` trim markers on either side.

use crate::context::Context;
use crate::span::Span;
use crate::token::{ExpressionKind, ExpressionToken};

const MARKER_OPEN: &str = "<%";
const MARKER_CLOSE: &str = "%>";

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TokenizeError {
    #[error("unterminated erb marker starting at byte {}", span.start)]
    UnterminatedMarker { span: Span },
}

impl TokenizeError {
    pub fn span(&self) -> Span {
        match self {
            TokenizeError::UnterminatedMarker { span } => *span,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// Verbatim literal source. An escaped `<%%` yields a `<%` text segment and
    /// the extra `%` is dropped.
    Text(Span),
    Code(ExpressionToken),
    /// `<%# ... %>`
    Comment(Span),
}

impl Segment {
    pub fn span(&self) -> Span {
        match self {
            Segment::Text(span) | Segment::Comment(span) => *span,
            Segment::Code(token) => token.span,
        }
    }
}

enum Opener {
    Expression(ExpressionKind, bool),
    Comment,
}

fn opener_at(rest: &str) -> (Opener, usize) {
    if rest.starts_with("<%==") {
        (Opener::Expression(ExpressionKind::RawOutput, false), 4)
    } else if rest.starts_with("<%=") {
        (Opener::Expression(ExpressionKind::PlainOutput, false), 3)
    } else if rest.starts_with("<%#") {
        (Opener::Comment, 3)
    } else if rest.starts_with("<%-") {
        (Opener::Expression(ExpressionKind::Statement, true), 3)
    } else {
        (Opener::Expression(ExpressionKind::Statement, false), 2)
    }
}

/// Split `source` into segments. Fails on a marker without `%>`.
pub fn scan(source: &str) -> Result<Vec<Segment>, TokenizeError> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(rel) = source[pos..].find(MARKER_OPEN) {
        let start = pos + rel;
        if start > pos {
            out.push(Segment::Text(Span::new(pos, start)));
        }
        if source[start..].starts_with("<%%") {
            out.push(Segment::Text(Span::new(start, start + MARKER_OPEN.len())));
            pos = start + 3;
            continue;
        }

        let (opener, opener_len) = opener_at(&source[start..]);
        let code_start = start + opener_len;
        let Some(close_rel) = source[code_start..].find(MARKER_CLOSE) else {
            return Err(TokenizeError::UnterminatedMarker {
                span: Span::new(start, source.len()),
            });
        };
        let close = code_start + close_rel;
        let end = close + MARKER_CLOSE.len();
        let trim_right = close > code_start && source.as_bytes()[close - 1] == b'-';
        let code_end = if trim_right { close - 1 } else { close };

        match opener {
            Opener::Comment => out.push(Segment::Comment(Span::new(start, end))),
            Opener::Expression(kind, trim_left) => {
                let token = ExpressionToken {
                    kind,
                    code: source[code_start..code_end].to_string(),
                    code_span: Span::new(code_start, code_end),
                    span: Span::new(start, end),
                    context: Context::Text,
                    trim_left,
                    trim_right,
                };
                #[cfg(any(test, feature = "debug-stats"))]
                log::trace!(target: "erb.tokenizer", "marker {:?} at {}..{}", token.kind, start, end);
                out.push(Segment::Code(token));
            }
        }
        pos = end;
    }
    if pos < source.len() {
        out.push(Segment::Text(Span::new(pos, source.len())));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(segments: &[Segment]) -> Vec<(ExpressionKind, &str)> {
        segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Code(token) => Some((token.kind, token.code.as_str())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn recognizes_every_marker_kind() {
        let segments = scan("a<%= x %>b<%== y %>c<% if z %><%# note %>").unwrap();
        assert_eq!(
            codes(&segments),
            vec![
                (ExpressionKind::PlainOutput, " x "),
                (ExpressionKind::RawOutput, " y "),
                (ExpressionKind::Statement, " if z "),
            ]
        );
        assert!(matches!(segments.last(), Some(Segment::Comment(_))));
    }

    #[test]
    fn trim_markers_are_not_part_of_the_code() {
        let segments = scan("<%- foo -%>").unwrap();
        let Segment::Code(token) = &segments[0] else {
            panic!("expected code segment, got: {segments:?}");
        };
        assert_eq!(token.code, " foo ");
        assert!(token.trim_left);
        assert!(token.trim_right);
        assert_eq!(token.span, Span::new(0, 11));
        assert_eq!(token.code_span, Span::new(3, 8));
    }

    #[test]
    fn escaped_marker_is_literal_text() {
        let source = "x <%%= y %> z";
        let segments = scan(source).unwrap();
        let text: String = segments
            .iter()
            .map(|segment| match segment {
                Segment::Text(span) => span.slice(source),
                other => panic!("unexpected segment {other:?}"),
            })
            .collect();
        assert_eq!(text, "x <%= y %> z");
    }

    #[test]
    fn unterminated_marker_is_fatal() {
        let err = scan("<div><%= oops </div>").unwrap_err();
        assert_eq!(
            err,
            TokenizeError::UnterminatedMarker {
                span: Span::new(5, 20)
            }
        );
    }

    #[test]
    fn code_ends_at_first_close_delimiter() {
        let segments = scan("<%= '%>' %>").unwrap();
        assert_eq!(codes(&segments), vec![(ExpressionKind::PlainOutput, " '")]);
        assert!(matches!(segments.last(), Some(Segment::Text(_))));
    }
}
