//! Static safety rules for template markers.
//!
//! One pass over the node stream, in order. Violations are collected and never
//! stop the pass; tokenizer failures and unparseable marker code abort it,
//! except in the deprecated `javascript_tag` check, which skips code it cannot
//! parse. That asymmetry is kept as-is pending a product decision.

use crate::config::SafetyPolicy;
use crate::erb::TokenizeError;
use crate::ruby::{Expr, ParseError, RubyExpr};
use crate::span::Span;
use crate::token::{
    AttributeToken, Content, Element, ExpressionKind, ExpressionToken, Node, NodeStream,
    TemplateLanguage,
};
use crate::tokenizer::tokenize;

#[cfg(test)]
mod tests;

pub const RAW_OUTPUT_IN_ATTRIBUTE: &str =
    "erb interpolation with '<%==' inside html attribute is never safe";
pub const RAW_CALL_IN_ATTRIBUTE: &str =
    "erb interpolation with '<%= raw(...) %>' inside html attribute is never safe";
pub const HTML_SAFE_IN_ATTRIBUTE: &str =
    "erb interpolation with '<%= (...).html_safe %>' inside html attribute is never safe";
pub const UNSAFE_JAVASCRIPT_ATTRIBUTE: &str =
    "erb interpolation in javascript attribute must call '(...).to_json'";
pub const UNSAFE_JAVASCRIPT_TAG: &str =
    "erb interpolation in javascript tag must call '(...).to_json'";
pub const STATEMENT_NOT_ALLOWED: &str = "erb statement not allowed here; did you mean '<%=' ?";
pub const DEPRECATED_JAVASCRIPT_TAG: &str =
    "'javascript_tag do' syntax is deprecated; use inline <script> instead";

pub const DEFAULT_SCRIPT_TYPE: &str = "text/javascript";
pub const VALID_SCRIPT_TYPES: [&str; 3] = ["text/javascript", "text/template", "text/html"];

const DEPRECATED_JAVASCRIPT_HELPER: &str = "javascript_tag";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CheckOptions {
    pub template_language: TemplateLanguage,
}

/// What a violation points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Offender {
    Expression(ExpressionToken),
    Attribute(AttributeToken),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafetyError {
    pub message: String,
    pub offender: Offender,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error("cannot parse ruby code of the erb marker at byte {}: {error}", span.start)]
    Parse { error: ParseError, span: Span },
}

impl AnalysisError {
    pub fn span(&self) -> Span {
        match self {
            AnalysisError::Tokenize(err) => err.span(),
            AnalysisError::Parse { span, .. } => *span,
        }
    }
}

pub(crate) fn parse_marker(token: &ExpressionToken) -> Result<RubyExpr, AnalysisError> {
    RubyExpr::parse(&token.code).map_err(|error| AnalysisError::Parse {
        error,
        span: token.span,
    })
}

/// Script `type` of an element, `text/javascript` when absent.
pub fn script_type(element: &Element) -> String {
    element
        .attribute("type")
        .map(AttributeToken::unescaped_value)
        .unwrap_or_else(|| DEFAULT_SCRIPT_TYPE.to_string())
}

/// `end`-like statements close a block and are always allowed.
fn is_block_terminator(code: &str) -> bool {
    code.trim_start().starts_with("end")
}

pub struct SafetyTester<'p, P: SafetyPolicy + ?Sized> {
    policy: &'p P,
}

impl<'p, P: SafetyPolicy + ?Sized> SafetyTester<'p, P> {
    pub fn new(policy: &'p P) -> Self {
        Self { policy }
    }

    pub fn check(&self, source: &str, options: CheckOptions) -> Result<Vec<SafetyError>, AnalysisError> {
        let stream = tokenize(source, options.template_language)?;
        self.check_nodes(&stream)
    }

    pub fn check_nodes(&self, stream: &NodeStream) -> Result<Vec<SafetyError>, AnalysisError> {
        let mut run = Run {
            policy: self.policy,
            source: stream.source(),
            errors: Vec::new(),
        };
        for (index, node) in stream.iter().enumerate() {
            match node {
                Node::Element(element) => {
                    run.validate_element(element)?;
                    if element.name == "script" && !element.closing {
                        if let Some(content) = stream.get(index + 1).and_then(Node::content) {
                            let kind = script_type(element);
                            if kind == DEFAULT_SCRIPT_TYPE {
                                run.validate_script_content(content)?;
                            }
                            if kind != "text/html" {
                                run.validate_no_statements(content);
                            }
                        }
                        run.validate_script_type(element);
                    }
                }
                Node::Text(content) => match stream.template_language() {
                    TemplateLanguage::Javascript => {
                        run.validate_script_content(content)?;
                        run.validate_no_statements(content);
                    }
                    TemplateLanguage::Html => run.validate_no_javascript_tag(content),
                },
                Node::Comment(content) | Node::CData(content) => run.validate_no_statements(content),
            }
        }
        log::debug!(
            target: "erb.safety",
            "checked {} nodes, {} violations",
            stream.len(),
            run.errors.len()
        );
        Ok(run.errors)
    }
}

struct Run<'a, P: SafetyPolicy + ?Sized> {
    policy: &'a P,
    source: &'a str,
    errors: Vec<SafetyError>,
}

impl<P: SafetyPolicy + ?Sized> Run<'_, P> {
    fn add_expression_error(&mut self, token: &ExpressionToken, message: &str) {
        log::trace!(target: "erb.safety", "{message} at {:?}", token.span);
        self.errors.push(SafetyError {
            message: message.to_string(),
            offender: Offender::Expression(token.clone()),
            span: token.span,
        });
    }

    fn validate_element(&mut self, element: &Element) -> Result<(), AnalysisError> {
        for attribute in &element.attributes {
            for token in attribute.value_expressions() {
                match token.kind {
                    ExpressionKind::PlainOutput => {
                        self.validate_attribute_expression(&attribute.name, token)?
                    }
                    ExpressionKind::RawOutput => {
                        self.add_expression_error(token, RAW_OUTPUT_IN_ATTRIBUTE)
                    }
                    ExpressionKind::Statement => {}
                }
            }
        }
        Ok(())
    }

    /// Only the outermost call decides, so one marker yields at most one error.
    fn validate_attribute_expression(
        &mut self,
        attribute_name: &str,
        token: &ExpressionToken,
    ) -> Result<(), AnalysisError> {
        let expr = parse_marker(token)?;
        let javascript = self.policy.is_javascript_attribute(attribute_name);
        let message = match expr.calls().last() {
            Some(call) if call.method == "raw" => Some(RAW_CALL_IN_ATTRIBUTE),
            Some(call) if call.method == "html_safe" => Some(HTML_SAFE_IN_ATTRIBUTE),
            Some(call) if javascript && !self.policy.is_javascript_safe_method(&call.method) => {
                Some(UNSAFE_JAVASCRIPT_ATTRIBUTE)
            }
            None if javascript => Some(UNSAFE_JAVASCRIPT_ATTRIBUTE),
            _ => None,
        };
        if let Some(message) = message {
            self.add_expression_error(token, message);
        }
        Ok(())
    }

    fn validate_script_content(&mut self, content: &Content) -> Result<(), AnalysisError> {
        for token in content.expressions().filter(|token| token.kind.is_output()) {
            let expr = parse_marker(token)?;
            if !resolves_to_javascript(self.policy, expr.root()) {
                self.add_expression_error(token, UNSAFE_JAVASCRIPT_TAG);
            }
        }
        Ok(())
    }

    fn validate_no_statements(&mut self, content: &Content) {
        for token in content.expressions() {
            if token.kind == ExpressionKind::Statement && !is_block_terminator(&token.code) {
                self.add_expression_error(token, STATEMENT_NOT_ALLOWED);
            }
        }
    }

    fn validate_script_type(&mut self, element: &Element) {
        let Some(attribute) = element.attribute("type") else {
            return;
        };
        if VALID_SCRIPT_TYPES.contains(&attribute.unescaped_value().as_str()) {
            return;
        }
        let written = attribute.value(self.source).unwrap_or_default();
        let span = attribute
            .value_parts
            .first()
            .map(|part| part.span())
            .or(attribute.value_span)
            .unwrap_or(attribute.span);
        let message = format!(
            "{written} is not a valid type, valid types are {}",
            VALID_SCRIPT_TYPES.join(", ")
        );
        log::trace!(target: "erb.safety", "{message} at {span:?}");
        self.errors.push(SafetyError {
            message,
            offender: Offender::Attribute(attribute.clone()),
            span,
        });
    }

    /// Unparseable code is skipped here rather than reported.
    fn validate_no_javascript_tag(&mut self, content: &Content) {
        for token in content.expressions() {
            let expr = match RubyExpr::parse(&token.code) {
                Ok(expr) => expr,
                Err(err) => {
                    log::trace!(target: "erb.safety", "skipping unparseable marker at {:?}: {err}", token.span);
                    continue;
                }
            };
            let calls = expr.calls();
            if calls.len() == 1 && calls[0].method == DEPRECATED_JAVASCRIPT_HELPER {
                self.add_expression_error(token, DEPRECATED_JAVASCRIPT_TAG);
            }
        }
    }
}

/// Whether `expr` ends in a javascript-safe call, looking through `raw(...)`
/// arguments and `(...).html_safe` receivers.
pub(crate) fn resolves_to_javascript<P: SafetyPolicy + ?Sized>(policy: &P, expr: &Expr) -> bool {
    let calls = expr.chain();
    let Some(outer) = calls.last() else {
        return false;
    };
    match outer.method.as_str() {
        "raw" => {
            !outer.arguments.is_empty()
                && outer
                    .arguments
                    .iter()
                    .all(|argument| resolves_to_javascript(policy, argument))
        }
        "html_safe" => outer
            .receiver()
            .is_some_and(|receiver| resolves_to_javascript(policy, receiver)),
        method => policy.is_javascript_safe_method(method),
    }
}
