//! Compile mode.
//!
//! Every marker gets a decision from its context: a statement, or an output
//! guarded by the render-time check of its context. Markers that can never be
//! made safe are rejected here, before anything renders.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::SafetyPolicy;
use crate::context::Context;
use crate::erb::{self, TokenizeError};
use crate::ruby::{ParseError, strip_block_opener};
use crate::safety::{AnalysisError, RAW_OUTPUT_IN_ATTRIBUTE, SafetyTester};
use crate::span::Span;
use crate::token::{ExpressionKind, ExpressionToken, Node, NodeStream, Part, TemplateLanguage};
use crate::tokenizer::tokenize;

mod runtime;

pub use runtime::{OutputBuffer, RenderError, Scope, Value};

pub const BLOCK_NOT_ALLOWED: &str = "Block not allowed at this location.";

/// Render-time check applied to an interpolated value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Guard {
    Text,
    AttributeValue(char),
    UnquotedAttributeValue,
    TagName,
    AttributeName,
    /// Between attributes; only `html_attributes(...)` results are accepted.
    TagAttributes,
    Comment,
    Script,
    RawText(String),
    CData,
}

impl From<&Context> for Guard {
    fn from(context: &Context) -> Self {
        match context {
            Context::TagName => Guard::TagName,
            Context::AttributeName => Guard::AttributeName,
            Context::AttributeValueQuoted(quote) => Guard::AttributeValue(*quote),
            Context::AttributeValueUnquoted => Guard::UnquotedAttributeValue,
            Context::TagBody => Guard::TagAttributes,
            Context::Comment => Guard::Comment,
            Context::CData => Guard::CData,
            Context::RawTextBody(name) => Guard::RawText(name.clone()),
            Context::ScriptBody => Guard::Script,
            Context::Text => Guard::Text,
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Text => f.write_str("text"),
            Guard::AttributeValue(_) => f.write_str("attribute value"),
            Guard::UnquotedAttributeValue => f.write_str("unquoted attribute value"),
            Guard::TagName => f.write_str("tag name"),
            Guard::AttributeName => f.write_str("attribute name"),
            Guard::TagAttributes => f.write_str("tag"),
            Guard::Comment => f.write_str("html comment"),
            Guard::Script => f.write_str("script tag"),
            Guard::RawText(name) => write!(f, "{name} tag"),
            Guard::CData => f.write_str("cdata"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Statement,
    Output { guard: Guard, raw: bool },
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("{message}")]
    DontInterpolateHere { message: String, span: Span },
    #[error("{message}")]
    Unsafe { message: String, span: Span },
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error("cannot parse ruby code of the erb marker at byte {}: {error}", span.start)]
    Parse { error: ParseError, span: Span },
}

impl CompileError {
    pub fn span(&self) -> Span {
        match self {
            CompileError::DontInterpolateHere { span, .. }
            | CompileError::Unsafe { span, .. }
            | CompileError::Parse { span, .. } => *span,
            CompileError::Tokenize(err) => err.span(),
        }
    }
}

impl From<AnalysisError> for CompileError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Tokenize(err) => CompileError::Tokenize(err),
            AnalysisError::Parse { error, span } => CompileError::Parse { error, span },
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompileOptions {
    pub template_language: TemplateLanguage,
    /// Reject templates the static rules flag, with the first violation.
    pub enforce_static_rules: bool,
}

/// One guarded output in a compiled program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interpolation {
    pub code: String,
    pub guard: Guard,
    pub raw: bool,
    /// Span of the marker.
    pub span: Span,
    /// Source from the start of the enclosing construct through the marker,
    /// closed with `>` inside tags. Used in render-time messages.
    pub around: String,
    /// Source of the enclosing tag up to the marker.
    pub prefix: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Output(Interpolation),
    Statement { code: String, span: Span },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
    pub segments: Vec<Segment>,
}

impl Program {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Run the program against `scope`. Statements are handed to the scope in
    /// order; control flow is the scope's concern.
    pub fn render<S: Scope + ?Sized>(&self, scope: &mut S) -> Result<String, RenderError> {
        let mut buffer = OutputBuffer::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => buffer.push_literal(text),
                Segment::Output(interpolation) => {
                    let value = scope.evaluate(&interpolation.code);
                    buffer.append(interpolation, value)?;
                }
                Segment::Statement { code, .. } => scope.execute(code),
            }
        }
        Ok(buffer.into_string())
    }
}

/// Where a marker sits in the markup, beyond its context.
#[derive(Clone, Debug)]
struct Site {
    token: ExpressionToken,
    construct_start: usize,
    in_tag: bool,
    /// Start of the attribute value for markers in an unquoted value that
    /// follow literal value text.
    unquoted_after_text: Option<usize>,
}

fn collect_sites(stream: &NodeStream) -> BTreeMap<usize, Site> {
    let mut sites = BTreeMap::new();
    let mut add = |token: &ExpressionToken, construct_start: usize, in_tag: bool, after: Option<usize>| {
        sites.insert(
            token.span.start,
            Site {
                token: token.clone(),
                construct_start,
                in_tag,
                unquoted_after_text: after,
            },
        );
    };
    for (index, node) in stream.iter().enumerate() {
        match node {
            Node::Element(element) => {
                let start = element.span.start;
                for token in element.expressions() {
                    add(token, start, true, None);
                }
                for attribute in element.attributes.iter().filter(|attr| attr.quote.is_none()) {
                    for (position, part) in attribute.value_parts.iter().enumerate() {
                        let Part::Expression(token) = part else {
                            continue;
                        };
                        let after_text = attribute.value_parts[..position]
                            .iter()
                            .any(|part| part.text().is_some());
                        if after_text {
                            let value_start = attribute
                                .value_span
                                .map_or(attribute.value_parts[0].span().start, |span| span.start);
                            add(token, start, true, Some(value_start));
                        }
                    }
                }
            }
            Node::Text(content) | Node::Comment(content) | Node::CData(content) => {
                let opening_tag = index
                    .checked_sub(1)
                    .and_then(|previous| stream.get(previous))
                    .and_then(Node::as_element)
                    .filter(|element| !element.closing);
                for token in content.expressions() {
                    let construct_start = match (&token.context, opening_tag) {
                        (Context::ScriptBody | Context::RawTextBody(_), Some(element)) => {
                            element.span.start
                        }
                        _ => content.span.start,
                    };
                    add(token, construct_start, false, None);
                }
            }
        }
    }
    sites
}

/// Per-marker decision. Rejects markers no render-time check can make safe.
fn decide(site: &Site, source: &str) -> Result<Decision, CompileError> {
    let token = &site.token;
    if site.in_tag && strip_block_opener(&token.code).1 {
        return Err(CompileError::DontInterpolateHere {
            message: BLOCK_NOT_ALLOWED.to_string(),
            span: token.span,
        });
    }
    if token.kind == ExpressionKind::Statement {
        return Ok(Decision::Statement);
    }
    if site.in_tag && token.kind == ExpressionKind::RawOutput {
        return Err(CompileError::DontInterpolateHere {
            message: RAW_OUTPUT_IN_ATTRIBUTE.to_string(),
            span: token.span,
        });
    }
    if let Some(value_start) = site.unquoted_after_text {
        let tag = &source[site.construct_start..value_start];
        let value = &source[value_start..token.span.end];
        return Err(CompileError::DontInterpolateHere {
            message: format!(
                "Do not interpolate without quotes around this attribute value. Instead of {tag}{value}> try {tag}\"{value}\">."
            ),
            span: token.span,
        });
    }
    Ok(Decision::Output {
        guard: Guard::from(&token.context),
        raw: token.kind == ExpressionKind::RawOutput,
    })
}

/// Indentation between the start of the line and `start`, when there is
/// nothing else on the line before it.
fn leading_space(source: &str, start: usize) -> Option<Span> {
    let line_start = source[..start].rfind('\n').map_or(0, |newline| newline + 1);
    source[line_start..start]
        .bytes()
        .all(|byte| byte == b' ' || byte == b'\t')
        .then(|| Span::new(line_start, start))
}

/// Trailing blanks and the line terminator right after `end`.
fn trailing_space(source: &str, end: usize) -> Option<Span> {
    let rest = &source[end..];
    let blanks = rest.bytes().take_while(|byte| *byte == b' ' || *byte == b'\t').count();
    let after = &rest[blanks..];
    let terminator = if after.starts_with('\n') {
        1
    } else if after.starts_with("\r\n") {
        2
    } else {
        return None;
    };
    Some(Span::new(end, end + blanks + terminator))
}

struct Emitter<'s> {
    source: &'s str,
    segments: Vec<Segment>,
    pending: String,
    skip_to: usize,
}

impl<'s> Emitter<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            segments: Vec::new(),
            pending: String::new(),
            skip_to: 0,
        }
    }

    fn literal(&mut self, span: Span) {
        let start = span.start.max(self.skip_to);
        if start < span.end {
            self.pending.push_str(&self.source[start..span.end]);
        }
    }

    fn drop_before(&mut self, space: Span) {
        let text = space.slice(self.source);
        if self.pending.ends_with(text) {
            self.pending.truncate(self.pending.len() - text.len());
        }
    }

    fn drop_after(&mut self, space: Span) {
        self.skip_to = self.skip_to.max(space.end);
    }

    /// Trimming for a marker spanning `span`. Statements and comments alone on
    /// their line vanish with the line; `<%-` and `-%>` trim their side.
    fn trim(&mut self, span: Span, whole_line: bool, trim_left: bool, trim_right: bool) {
        let before = leading_space(self.source, span.start);
        let after = trailing_space(self.source, span.end);
        if whole_line && let (Some(before), Some(after)) = (before, after) {
            self.drop_before(before);
            self.drop_after(after);
            return;
        }
        if trim_left && let Some(before) = before {
            self.drop_before(before);
        }
        if trim_right && let Some(after) = after {
            self.drop_after(after);
        }
    }

    fn push(&mut self, segment: Segment) {
        if !self.pending.is_empty() {
            self.segments.push(Segment::Literal(std::mem::take(&mut self.pending)));
        }
        self.segments.push(segment);
    }

    fn finish(mut self) -> Program {
        if !self.pending.is_empty() {
            self.segments.push(Segment::Literal(std::mem::take(&mut self.pending)));
        }
        Program {
            segments: self.segments,
        }
    }
}

pub struct Compiler<'p, P: SafetyPolicy + ?Sized> {
    policy: &'p P,
    options: CompileOptions,
}

impl<'p, P: SafetyPolicy + ?Sized> Compiler<'p, P> {
    pub fn new(policy: &'p P) -> Self {
        Self {
            policy,
            options: CompileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn compile(&self, source: &str) -> Result<Program, CompileError> {
        let stream = tokenize(source, self.options.template_language)?;
        if self.options.enforce_static_rules {
            let errors = SafetyTester::new(self.policy).check_nodes(&stream)?;
            if let Some(first) = errors.into_iter().next() {
                return Err(CompileError::Unsafe {
                    message: first.message,
                    span: first.span,
                });
            }
        }

        let sites = collect_sites(&stream);
        let mut emitter = Emitter::new(source);
        for segment in erb::scan(source)? {
            match segment {
                erb::Segment::Text(span) => emitter.literal(span),
                erb::Segment::Comment(span) => emitter.trim(span, true, false, false),
                erb::Segment::Code(scanned) => {
                    let site = sites.get(&scanned.span.start).cloned().unwrap_or_else(|| {
                        log::trace!(target: "erb.compile", "no markup site for marker at {:?}", scanned.span);
                        Site {
                            construct_start: scanned.span.start,
                            token: scanned.clone(),
                            in_tag: false,
                            unquoted_after_text: None,
                        }
                    });
                    let decision = decide(&site, source)?;
                    let token = site.token;
                    emitter.trim(
                        token.span,
                        decision == Decision::Statement,
                        token.trim_left,
                        token.trim_right,
                    );
                    match decision {
                        Decision::Statement => emitter.push(Segment::Statement {
                            code: token.code,
                            span: token.span,
                        }),
                        Decision::Output { guard, raw } => {
                            let prefix = source[site.construct_start..token.span.start].to_string();
                            let mut around = source[site.construct_start..token.span.end].to_string();
                            if site.in_tag {
                                around.push('>');
                            }
                            emitter.push(Segment::Output(Interpolation {
                                code: token.code,
                                guard,
                                raw,
                                span: token.span,
                                around,
                                prefix,
                            }));
                        }
                    }
                }
            }
        }
        let program = emitter.finish();
        log::debug!(
            target: "erb.compile",
            "compiled {} bytes into {} segments",
            source.len(),
            program.segments.len()
        );
        Ok(program)
    }
}
