//! Node stream model produced by the tokenizer.
//!
//! Determinism contract:
//! - Nodes are stored in source order, one tokenizer pass per stream.
//! - Parts inside a node or attribute are stored in source order.
//! - Attributes are kept in encounter order; duplicates are not dropped, but
//!   lookups by name return the first occurrence.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::context::Context;
use crate::entities::decode_entities;
use crate::span::Span;

/// Which top-level body scanning a template uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateLanguage {
    #[default]
    Html,
    Javascript,
}

impl fmt::Display for TemplateLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateLanguage::Html => f.write_str("html"),
            TemplateLanguage::Javascript => f.write_str("javascript"),
        }
    }
}

impl FromStr for TemplateLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(TemplateLanguage::Html),
            "javascript" | "js" => Ok(TemplateLanguage::Javascript),
            other => Err(format!(
                "unknown template language '{other}', expected html or javascript"
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExpressionKind {
    /// `<%= ... %>`: the value is escaped unless it is pre-marked safe.
    PlainOutput,
    /// `<%== ... %>`: the value bypasses escaping.
    RawOutput,
    /// `<% ... %>`: control flow, no direct output.
    Statement,
}

impl ExpressionKind {
    pub fn is_output(self) -> bool {
        matches!(self, ExpressionKind::PlainOutput | ExpressionKind::RawOutput)
    }

    pub fn opening(self) -> &'static str {
        match self {
            ExpressionKind::PlainOutput => "<%=",
            ExpressionKind::RawOutput => "<%==",
            ExpressionKind::Statement => "<%",
        }
    }
}

/// One template marker and the code inside it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpressionToken {
    pub kind: ExpressionKind,
    pub code: String,
    /// Span of `code` only.
    pub code_span: Span,
    /// Span of the whole marker, delimiters included.
    pub span: Span,
    /// Lexical context of the marker, assigned by the markup tokenizer.
    pub context: Context,
    /// `<%-`
    pub trim_left: bool,
    /// `-%>`
    pub trim_right: bool,
}

/// Literal text or a marker inside a node, tag name, or attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Part {
    Text { span: Span, text: String },
    Expression(ExpressionToken),
}

impl Part {
    pub fn span(&self) -> Span {
        match self {
            Part::Text { span, .. } => *span,
            Part::Expression(token) => token.span,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Part::Text { text, .. } => Some(text),
            Part::Expression(_) => None,
        }
    }

    pub fn expression(&self) -> Option<&ExpressionToken> {
        match self {
            Part::Expression(token) => Some(token),
            Part::Text { .. } => None,
        }
    }
}

fn literal_text(parts: &[Part]) -> String {
    parts.iter().filter_map(Part::text).collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeToken {
    /// ASCII-lowercased literal part of the name.
    pub name: String,
    pub name_parts: Vec<Part>,
    pub quote: Option<char>,
    pub has_equals: bool,
    pub value_parts: Vec<Part>,
    /// Span of the value as written, quotes included.
    pub value_span: Option<Span>,
    /// Span of the whole attribute.
    pub span: Span,
}

impl AttributeToken {
    /// The value as written in the source, quotes included.
    pub fn value<'s>(&self, source: &'s str) -> Option<&'s str> {
        self.value_span.map(|span| span.slice(source))
    }

    /// Literal value text with character references decoded. Markers are skipped.
    pub fn unescaped_value(&self) -> String {
        decode_entities(&literal_text(&self.value_parts))
    }

    pub fn value_expressions(&self) -> impl Iterator<Item = &ExpressionToken> {
        self.value_parts.iter().filter_map(Part::expression)
    }

    pub fn name_expressions(&self) -> impl Iterator<Item = &ExpressionToken> {
        self.name_parts.iter().filter_map(Part::expression)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    /// ASCII-lowercased literal part of the tag name.
    pub name: String,
    pub name_parts: Vec<Part>,
    pub closing: bool,
    pub self_closing: bool,
    pub attributes: Vec<AttributeToken>,
    /// Markers inside the tag but outside any attribute.
    pub interpolations: Vec<ExpressionToken>,
    pub span: Span,
}

impl Element {
    /// First attribute whose literal name equals `name` (ASCII case-insensitive).
    pub fn attribute(&self, name: &str) -> Option<&AttributeToken> {
        self.attributes
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
    }

    /// Every marker inside the tag, in source order.
    pub fn expressions(&self) -> Vec<&ExpressionToken> {
        let mut out: Vec<&ExpressionToken> = self
            .name_parts
            .iter()
            .filter_map(Part::expression)
            .chain(self.interpolations.iter())
            .chain(self.attributes.iter().flat_map(|attr| {
                attr.name_expressions().chain(attr.value_expressions())
            }))
            .collect();
        out.sort_by_key(|token| token.span.start);
        out
    }
}

/// Body of a text, comment, or CDATA node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Content {
    pub parts: Vec<Part>,
    pub span: Span,
}

impl Content {
    pub fn expressions(&self) -> impl Iterator<Item = &ExpressionToken> {
        self.parts.iter().filter_map(Part::expression)
    }

    pub fn literal_text(&self) -> String {
        literal_text(&self.parts)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(Content),
    Comment(Content),
    CData(Content),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Element(element) => element.span,
            Node::Text(content) | Node::Comment(content) | Node::CData(content) => content.span,
        }
    }

    /// Body parts for content nodes, `None` for elements.
    pub fn content(&self) -> Option<&Content> {
        match self {
            Node::Text(content) | Node::Comment(content) | Node::CData(content) => Some(content),
            Node::Element(_) => None,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }
}

/// Output of one tokenizer run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeStream {
    source: String,
    nodes: Vec<Node>,
    template_language: TemplateLanguage,
}

impl NodeStream {
    pub fn new(source: &str, nodes: Vec<Node>, template_language: TemplateLanguage) -> Self {
        Self {
            source: source.to_string(),
            nodes,
            template_language,
        }
    }

    /// The template the spans of this stream point into.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn template_language(&self) -> TemplateLanguage {
        self.template_language
    }
}

impl<'a> IntoIterator for &'a NodeStream {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}
