//! Markup tokenizer for templates with embedded markers.
//!
//! A single left-to-right pass over the segments produced by [`crate::erb::scan`].
//! Literal segments drive a simplified HTML tokenizer state machine; each marker
//! is an opaque event attached to whatever part of the markup is being built at
//! that point (tag name, attribute name, attribute value, tag body, or content),
//! and tagged with the [`Context`] computed from the scan state.
//!
//! Known limitations (intentional):
//! - No markup well-formedness validation; malformed tags are emitted as-is.
//! - Doctype and other `<!...>` declarations are kept as text.
//! - Rawtext/script end tags must be written literally (`</script>`), optionally
//!   with ASCII whitespace or `/` before `>`; a marker cannot form part of them.

use crate::context::{Context, ScanMode, ScanState, classify, is_rawtext_element};
use crate::erb::{Segment, TokenizeError, scan};
use crate::span::Span;
use crate::token::{
    AttributeToken, Content, Element, ExpressionToken, Node, NodeStream, Part, TemplateLanguage,
};
use tools::starts_with_ignore_ascii_case_at;

#[cfg(test)]
mod tests;

const COMMENT_START: &str = "<!--";
const COMMENT_END: &str = "-->";
const CDATA_START: &str = "<![CDATA[";
const CDATA_END: &str = "]]>";

/// Tokenize `source` into a node stream.
///
/// Fails only on an unterminated marker; everything else is tokenized on a
/// best-effort basis.
pub fn tokenize(source: &str, language: TemplateLanguage) -> Result<NodeStream, TokenizeError> {
    let segments = scan(source)?;
    let nodes = match language {
        TemplateLanguage::Html => Tokenizer::new(source).run(&segments),
        TemplateLanguage::Javascript => javascript_body(source, &segments),
    };
    log::debug!(
        target: "erb.tokenizer",
        "tokenized {} bytes into {} nodes ({language})",
        source.len(),
        nodes.len()
    );
    Ok(NodeStream::new(source, nodes, language))
}

/// In javascript mode the whole template is one script body.
fn javascript_body(source: &str, segments: &[Segment]) -> Vec<Node> {
    let mut parts = Vec::new();
    for segment in segments {
        match segment {
            Segment::Text(span) => parts.push(Part::Text {
                span: *span,
                text: span.slice(source).to_string(),
            }),
            Segment::Code(token) => {
                let mut token = token.clone();
                token.context = Context::ScriptBody;
                parts.push(Part::Expression(token));
            }
            Segment::Comment(_) => {}
        }
    }
    if parts.is_empty() {
        return Vec::new();
    }
    let span = parts[0].span().join(parts[parts.len() - 1].span());
    vec![Node::Text(Content { parts, span })]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ContentKind {
    Text,
    Comment,
    CData,
}

#[derive(Debug)]
struct PendingContent {
    kind: ContentKind,
    start: usize,
    parts: Vec<Part>,
}

#[derive(Debug)]
struct PendingElement {
    start: usize,
    closing: bool,
    self_closing: bool,
    name_parts: Vec<Part>,
    attributes: Vec<AttributeToken>,
    interpolations: Vec<ExpressionToken>,
}

#[derive(Debug)]
struct PendingAttribute {
    start: usize,
    end: usize,
    name_parts: Vec<Part>,
    has_equals: bool,
    quote: Option<char>,
    value_parts: Vec<Part>,
    value_span: Option<Span>,
}

impl PendingAttribute {
    fn new(start: usize) -> Self {
        Self {
            start,
            end: start,
            name_parts: Vec::new(),
            has_equals: false,
            quote: None,
            value_parts: Vec::new(),
            value_span: None,
        }
    }

    fn extend_value_span(&mut self, span: Span) {
        self.value_span = Some(match self.value_span {
            Some(existing) => existing.join(span),
            None => span,
        });
    }
}

/// Append one literal character, merging with a directly preceding text part.
fn push_char(parts: &mut Vec<Part>, ch: char, offset: usize) {
    let end = offset + ch.len_utf8();
    if let Some(Part::Text { span, text }) = parts.last_mut()
        && span.end == offset
    {
        text.push(ch);
        span.end = end;
        return;
    }
    parts.push(Part::Text {
        span: Span::new(offset, end),
        text: ch.to_string(),
    });
}

fn literal_name(parts: &[Part]) -> String {
    parts
        .iter()
        .filter_map(Part::text)
        .collect::<String>()
        .to_ascii_lowercase()
}

struct Tokenizer<'s> {
    source: &'s str,
    state: ScanState,
    nodes: Vec<Node>,
    content: Option<PendingContent>,
    element: Option<PendingElement>,
    attribute: Option<PendingAttribute>,
}

enum Step {
    /// Consumed this many bytes.
    Advance(usize),
    /// Switched state; process the same character again.
    Reprocess,
}

impl<'s> Tokenizer<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            state: ScanState::new(ScanMode::Data),
            nodes: Vec::new(),
            content: None,
            element: None,
            attribute: None,
        }
    }

    fn run(mut self, segments: &[Segment]) -> Vec<Node> {
        for (index, segment) in segments.iter().enumerate() {
            match segment {
                Segment::Text(span) => {
                    let marker_follows = matches!(segments.get(index + 1), Some(Segment::Code(_)));
                    self.scan_text(*span, marker_follows);
                }
                Segment::Code(token) => self.marker(token),
                Segment::Comment(_) => {}
            }
        }
        self.finish();
        self.nodes
    }

    fn transition_to(&mut self, mode: ScanMode) {
        #[cfg(any(test, feature = "debug-stats"))]
        log::trace!(target: "erb.tokenizer", "state {:?} -> {:?}", self.state.mode, mode);
        self.state.mode = mode;
    }

    fn scan_text(&mut self, span: Span, marker_follows: bool) {
        let text = span.slice(self.source);
        let mut i = 0;
        while let Some(ch) = text[i..].chars().next() {
            let offset = span.start + i;
            match self.step(text, i, ch, offset, marker_follows) {
                Step::Advance(n) => i += n,
                Step::Reprocess => {}
            }
        }
    }

    fn step(&mut self, text: &str, i: usize, ch: char, offset: usize, marker_follows: bool) -> Step {
        let one = ch.len_utf8();
        match self.state.mode {
            ScanMode::Data => self.step_data(text, i, ch, offset, marker_follows),
            ScanMode::TagOpen | ScanMode::EndTagOpen => {
                if ch.is_ascii_alphabetic() {
                    self.transition_to(ScanMode::TagName);
                    Step::Reprocess
                } else {
                    self.abandon_tag_open();
                    Step::Reprocess
                }
            }
            ScanMode::TagName => {
                match ch {
                    c if c.is_ascii_whitespace() => self.transition_to(ScanMode::BeforeAttributeName),
                    '/' => self.transition_to(ScanMode::SelfClosingStartTag),
                    '>' => self.emit_element(offset + one),
                    c => {
                        if let Some(element) = self.element.as_mut() {
                            push_char(&mut element.name_parts, c, offset);
                        }
                    }
                }
                Step::Advance(one)
            }
            ScanMode::BeforeAttributeName => {
                match ch {
                    c if c.is_ascii_whitespace() => {}
                    '/' => self.transition_to(ScanMode::SelfClosingStartTag),
                    '>' => self.emit_element(offset + one),
                    c => {
                        let mut attribute = PendingAttribute::new(offset);
                        push_char(&mut attribute.name_parts, c, offset);
                        attribute.end = offset + one;
                        self.attribute = Some(attribute);
                        self.transition_to(ScanMode::AttributeName);
                    }
                }
                Step::Advance(one)
            }
            ScanMode::AttributeName => {
                match ch {
                    c if c.is_ascii_whitespace() => self.transition_to(ScanMode::AfterAttributeName),
                    '/' => {
                        self.finish_attribute();
                        self.transition_to(ScanMode::SelfClosingStartTag);
                    }
                    '>' => {
                        self.finish_attribute();
                        self.emit_element(offset + one);
                    }
                    '=' => {
                        if let Some(attribute) = self.attribute.as_mut() {
                            attribute.has_equals = true;
                            attribute.end = offset + one;
                        }
                        self.transition_to(ScanMode::BeforeAttributeValue);
                    }
                    c => {
                        if let Some(attribute) = self.attribute.as_mut() {
                            push_char(&mut attribute.name_parts, c, offset);
                            attribute.end = offset + one;
                        }
                    }
                }
                Step::Advance(one)
            }
            ScanMode::AfterAttributeName => match ch {
                c if c.is_ascii_whitespace() => Step::Advance(one),
                '=' => {
                    if let Some(attribute) = self.attribute.as_mut() {
                        attribute.has_equals = true;
                        attribute.end = offset + one;
                    }
                    self.transition_to(ScanMode::BeforeAttributeValue);
                    Step::Advance(one)
                }
                _ => {
                    self.finish_attribute();
                    self.transition_to(ScanMode::BeforeAttributeName);
                    Step::Reprocess
                }
            },
            ScanMode::BeforeAttributeValue => match ch {
                c if c.is_ascii_whitespace() => Step::Advance(one),
                '"' | '\'' => {
                    if let Some(attribute) = self.attribute.as_mut() {
                        attribute.quote = Some(ch);
                        attribute.extend_value_span(Span::new(offset, offset + one));
                        attribute.end = offset + one;
                    }
                    self.transition_to(if ch == '"' {
                        ScanMode::AttributeValueDoubleQuoted
                    } else {
                        ScanMode::AttributeValueSingleQuoted
                    });
                    Step::Advance(one)
                }
                '>' => {
                    self.finish_attribute();
                    self.emit_element(offset + one);
                    Step::Advance(one)
                }
                _ => {
                    self.transition_to(ScanMode::AttributeValueUnquoted);
                    Step::Reprocess
                }
            },
            ScanMode::AttributeValueDoubleQuoted | ScanMode::AttributeValueSingleQuoted => {
                let quote = if self.state.mode == ScanMode::AttributeValueDoubleQuoted {
                    '"'
                } else {
                    '\''
                };
                if let Some(attribute) = self.attribute.as_mut() {
                    attribute.extend_value_span(Span::new(offset, offset + one));
                    attribute.end = offset + one;
                    if ch != quote {
                        push_char(&mut attribute.value_parts, ch, offset);
                    }
                }
                if ch == quote {
                    self.transition_to(ScanMode::AfterAttributeValueQuoted);
                }
                Step::Advance(one)
            }
            ScanMode::AttributeValueUnquoted => {
                match ch {
                    c if c.is_ascii_whitespace() => {
                        self.finish_attribute();
                        self.transition_to(ScanMode::BeforeAttributeName);
                    }
                    '>' => {
                        self.finish_attribute();
                        self.emit_element(offset + one);
                    }
                    c => {
                        if let Some(attribute) = self.attribute.as_mut() {
                            push_char(&mut attribute.value_parts, c, offset);
                            attribute.extend_value_span(Span::new(offset, offset + one));
                            attribute.end = offset + one;
                        }
                    }
                }
                Step::Advance(one)
            }
            ScanMode::AfterAttributeValueQuoted => {
                self.finish_attribute();
                match ch {
                    c if c.is_ascii_whitespace() => {
                        self.transition_to(ScanMode::BeforeAttributeName);
                        Step::Advance(one)
                    }
                    '/' => {
                        self.transition_to(ScanMode::SelfClosingStartTag);
                        Step::Advance(one)
                    }
                    '>' => {
                        self.emit_element(offset + one);
                        Step::Advance(one)
                    }
                    _ => {
                        self.transition_to(ScanMode::BeforeAttributeName);
                        Step::Reprocess
                    }
                }
            }
            ScanMode::SelfClosingStartTag => {
                if ch == '>' {
                    if let Some(element) = self.element.as_mut() {
                        element.self_closing = true;
                    }
                    self.emit_element(offset + one);
                    Step::Advance(one)
                } else {
                    self.transition_to(ScanMode::BeforeAttributeName);
                    Step::Reprocess
                }
            }
            ScanMode::Comment => self.step_delimited(text, i, ch, offset, COMMENT_END),
            ScanMode::CData => self.step_delimited(text, i, ch, offset, CDATA_END),
            ScanMode::RawText | ScanMode::ScriptData => self.step_body(text, i, ch, offset),
        }
    }

    /// `marker_follows`: the current literal segment is directly followed by a marker,
    /// so a trailing `<` or `</` opens a tag whose name is interpolated.
    fn step_data(&mut self, text: &str, i: usize, ch: char, offset: usize, marker_follows: bool) -> Step {
        if ch != '<' {
            self.push_content_char(ContentKind::Text, ch, offset);
            return Step::Advance(ch.len_utf8());
        }
        let rest = &text[i..];
        let bytes = rest.as_bytes();
        if rest.starts_with(COMMENT_START) {
            self.flush_content(offset);
            self.open_content(ContentKind::Comment, offset);
            self.transition_to(ScanMode::Comment);
            return Step::Advance(COMMENT_START.len());
        }
        if rest.starts_with(CDATA_START) {
            self.flush_content(offset);
            self.open_content(ContentKind::CData, offset);
            self.transition_to(ScanMode::CData);
            return Step::Advance(CDATA_START.len());
        }
        if bytes.len() >= 2 && bytes[1] == b'/' {
            let followed_by_name = bytes.get(2).is_some_and(u8::is_ascii_alphabetic);
            let before_marker = bytes.len() == 2 && marker_follows;
            if followed_by_name || before_marker {
                self.flush_content(offset);
                self.open_element(offset, true);
                self.transition_to(if followed_by_name {
                    ScanMode::TagName
                } else {
                    ScanMode::EndTagOpen
                });
                return Step::Advance(2);
            }
        }
        let followed_by_name = bytes.get(1).is_some_and(u8::is_ascii_alphabetic);
        let before_marker = bytes.len() == 1 && marker_follows;
        if followed_by_name || before_marker {
            self.flush_content(offset);
            self.open_element(offset, false);
            self.transition_to(if followed_by_name {
                ScanMode::TagName
            } else {
                ScanMode::TagOpen
            });
            return Step::Advance(1);
        }
        self.push_content_char(ContentKind::Text, ch, offset);
        Step::Advance(1)
    }

    fn step_delimited(&mut self, text: &str, i: usize, ch: char, offset: usize, terminator: &str) -> Step {
        if text[i..].starts_with(terminator) {
            self.flush_content(offset + terminator.len());
            self.transition_to(ScanMode::Data);
            return Step::Advance(terminator.len());
        }
        let kind = if self.state.mode == ScanMode::Comment {
            ContentKind::Comment
        } else {
            ContentKind::CData
        };
        self.push_content_char(kind, ch, offset);
        Step::Advance(ch.len_utf8())
    }

    fn step_body(&mut self, text: &str, i: usize, ch: char, offset: usize) -> Step {
        if ch == '<' && self.at_body_end_tag(text, i) {
            self.flush_content(offset);
            self.state.body_element = None;
            self.transition_to(ScanMode::Data);
            return Step::Reprocess;
        }
        self.push_content_char(ContentKind::Text, ch, offset);
        Step::Advance(ch.len_utf8())
    }

    /// `</name` followed by whitespace, `/` or `>`, ignoring ASCII case.
    fn at_body_end_tag(&self, text: &str, i: usize) -> bool {
        let Some(name) = self.state.body_element.as_deref() else {
            return false;
        };
        let bytes = text.as_bytes();
        if !starts_with_ignore_ascii_case_at(bytes, i, b"</")
            || !starts_with_ignore_ascii_case_at(bytes, i + 2, name.as_bytes())
        {
            return false;
        }
        bytes
            .get(i + 2 + name.len())
            .is_some_and(|&b| b.is_ascii_whitespace() || b == b'/' || b == b'>')
    }

    fn marker(&mut self, token: &ExpressionToken) {
        let mut token = token.clone();
        token.context = classify(&self.state);
        #[cfg(any(test, feature = "debug-stats"))]
        log::trace!(target: "erb.tokenizer", "marker {:?} classified as {:?}", token.code, token.context);
        match self.state.mode {
            ScanMode::Data => self.push_content_part(ContentKind::Text, Part::Expression(token)),
            ScanMode::Comment => self.push_content_part(ContentKind::Comment, Part::Expression(token)),
            ScanMode::CData => self.push_content_part(ContentKind::CData, Part::Expression(token)),
            ScanMode::RawText | ScanMode::ScriptData => {
                self.push_content_part(ContentKind::Text, Part::Expression(token))
            }
            ScanMode::TagOpen | ScanMode::EndTagOpen | ScanMode::TagName => {
                if let Some(element) = self.element.as_mut() {
                    element.name_parts.push(Part::Expression(token));
                }
                self.transition_to(ScanMode::TagName);
            }
            ScanMode::AttributeName => {
                if let Some(attribute) = self.attribute.as_mut() {
                    attribute.end = token.span.end;
                    attribute.name_parts.push(Part::Expression(token));
                }
            }
            ScanMode::BeforeAttributeValue | ScanMode::AttributeValueUnquoted => {
                if let Some(attribute) = self.attribute.as_mut() {
                    attribute.extend_value_span(token.span);
                    attribute.end = token.span.end;
                    attribute.value_parts.push(Part::Expression(token));
                }
                self.transition_to(ScanMode::AttributeValueUnquoted);
            }
            ScanMode::AttributeValueDoubleQuoted | ScanMode::AttributeValueSingleQuoted => {
                if let Some(attribute) = self.attribute.as_mut() {
                    attribute.extend_value_span(token.span);
                    attribute.end = token.span.end;
                    attribute.value_parts.push(Part::Expression(token));
                }
            }
            ScanMode::BeforeAttributeName
            | ScanMode::AfterAttributeName
            | ScanMode::AfterAttributeValueQuoted
            | ScanMode::SelfClosingStartTag => {
                self.finish_attribute();
                if let Some(element) = self.element.as_mut() {
                    element.interpolations.push(token);
                }
                self.transition_to(ScanMode::BeforeAttributeName);
            }
        }
    }

    fn open_content(&mut self, kind: ContentKind, start: usize) {
        self.content = Some(PendingContent {
            kind,
            start,
            parts: Vec::new(),
        });
    }

    fn content_for(&mut self, kind: ContentKind, start: usize) -> &mut PendingContent {
        if self.content.as_ref().is_some_and(|content| content.kind != kind) {
            self.flush_content(start);
        }
        self.content.get_or_insert_with(|| PendingContent {
            kind,
            start,
            parts: Vec::new(),
        })
    }

    fn push_content_char(&mut self, kind: ContentKind, ch: char, offset: usize) {
        let content = self.content_for(kind, offset);
        push_char(&mut content.parts, ch, offset);
    }

    fn push_content_part(&mut self, kind: ContentKind, part: Part) {
        let content = self.content_for(kind, part.span().start);
        content.parts.push(part);
    }

    /// Emit the pending content node. Comments and CDATA end at `end` (past their
    /// terminator); text ends with its last part.
    fn flush_content(&mut self, end: usize) {
        let Some(content) = self.content.take() else {
            return;
        };
        let end = match content.kind {
            ContentKind::Text => content
                .parts
                .last()
                .map_or(content.start, |part| part.span().end),
            ContentKind::Comment | ContentKind::CData => end,
        };
        let span = Span::new(content.start, end.max(content.start));
        let body = Content {
            parts: content.parts,
            span,
        };
        match content.kind {
            ContentKind::Text => {
                if !body.parts.is_empty() {
                    self.nodes.push(Node::Text(body));
                }
            }
            ContentKind::Comment => self.nodes.push(Node::Comment(body)),
            ContentKind::CData => self.nodes.push(Node::CData(body)),
        }
    }

    fn open_element(&mut self, start: usize, closing: bool) {
        self.element = Some(PendingElement {
            start,
            closing,
            self_closing: false,
            name_parts: Vec::new(),
            attributes: Vec::new(),
            interpolations: Vec::new(),
        });
    }

    /// `<` or `</` turned out not to open a tag: keep it as text.
    fn abandon_tag_open(&mut self) {
        let Some(element) = self.element.take() else {
            self.transition_to(ScanMode::Data);
            return;
        };
        let opener = if self.state.mode == ScanMode::EndTagOpen {
            "</"
        } else {
            "<"
        };
        self.transition_to(ScanMode::Data);
        let merge_previous = self.content.is_none()
            && matches!(
                self.nodes.last(),
                Some(Node::Text(previous)) if previous.span.end == element.start
            );
        if merge_previous && let Some(Node::Text(previous)) = self.nodes.pop() {
            self.content = Some(PendingContent {
                kind: ContentKind::Text,
                start: previous.span.start,
                parts: previous.parts,
            });
        }
        for (n, ch) in opener.char_indices() {
            self.push_content_char(ContentKind::Text, ch, element.start + n);
        }
    }

    fn finish_attribute(&mut self) {
        let Some(attribute) = self.attribute.take() else {
            return;
        };
        let token = AttributeToken {
            name: literal_name(&attribute.name_parts),
            name_parts: attribute.name_parts,
            quote: attribute.quote,
            has_equals: attribute.has_equals,
            value_parts: attribute.value_parts,
            value_span: attribute.value_span,
            span: Span::new(attribute.start, attribute.end),
        };
        if let Some(element) = self.element.as_mut() {
            element.attributes.push(token);
        }
    }

    fn emit_element(&mut self, end: usize) {
        self.finish_attribute();
        let Some(pending) = self.element.take() else {
            self.transition_to(ScanMode::Data);
            return;
        };
        let element = Element {
            name: literal_name(&pending.name_parts),
            name_parts: pending.name_parts,
            closing: pending.closing,
            self_closing: pending.self_closing,
            attributes: pending.attributes,
            interpolations: pending.interpolations,
            span: Span::new(pending.start, end),
        };
        let body_mode = if element.closing || element.self_closing {
            None
        } else if element.name == "script" {
            Some(ScanMode::ScriptData)
        } else if is_rawtext_element(&element.name) {
            Some(ScanMode::RawText)
        } else {
            None
        };
        match body_mode {
            Some(mode) => {
                self.state.body_element = Some(element.name.clone());
                self.transition_to(mode);
            }
            None => self.transition_to(ScanMode::Data),
        }
        self.nodes.push(Node::Element(element));
    }

    fn finish(&mut self) {
        let end = self.source.len();
        match self.state.mode {
            ScanMode::TagOpen | ScanMode::EndTagOpen => {
                self.abandon_tag_open();
                self.flush_content(end);
            }
            ScanMode::Data
            | ScanMode::Comment
            | ScanMode::CData
            | ScanMode::RawText
            | ScanMode::ScriptData => self.flush_content(end),
            _ => {
                if self.element.is_some() {
                    self.emit_element(end);
                }
            }
        }
    }
}
