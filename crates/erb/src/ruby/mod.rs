//! Call-chain analysis of Ruby expressions found in template markers.
//!
//! The safety rules only care about which methods are applied to a value
//! before it is written out, so the parser projects Ruby source onto a small
//! tree: method calls with their receiver and arguments, and everything else.
//!
//! A chain is read from the outermost call inwards along receivers and
//! reported outermost-last: `foo.bar.to_json` gives `[bar, to_json]`. A bare
//! identifier such as `value` is treated as the chain's receiver rather than a
//! call, unless it is written like a method call (`value?`, `value()`,
//! `value arg`) or owns a block.
//!
//! Heredocs (`<<~EOS`) are not supported; the opener lexes as a shift and the
//! marker fails to parse.

mod lexer;
mod parser;


use std::sync::LazyLock;

use regex::Regex;

use crate::span::Span;

/// Trailing block opener of ERB block helpers: `form_for x do |f|`, `each {`.
static BLOCK_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*((\s+|\))do|\{)(\s*\|[^|]*\|)?\s*\z").expect("block opener pattern is valid")
});

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub message: String,
    /// Byte offset into the code that was parsed.
    pub offset: usize,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Call(Call),
    Other(Other),
}

/// A method invocation, including operators Ruby dispatches as methods
/// (`a + b` is `+` on `a`, `a[1]` is `[]` on `a`, `!a` is `!` on `a`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub method: String,
    pub receiver: Option<Box<Expr>>,
    pub arguments: Vec<Expr>,
    /// `&.`
    pub safe_navigation: bool,
    pub has_block: bool,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Other {
    pub kind: OtherKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OtherKind {
    /// A bare name that may be a local variable or an argument-less call.
    Identifier(String),
    /// `Foo` or `Foo::Bar`.
    Constant(String),
    InstanceVariable(String),
    ClassVariable(String),
    GlobalVariable(String),
    SelfRef,
    Nil,
    True,
    False,
    Integer,
    Float,
    String,
    Symbol,
    Regexp,
    Array,
    Hash,
    Range,
    Lambda,
    And,
    Or,
    Ternary,
    Conditional,
    Defined,
    Assignment,
    Splat,
    BlockPass,
    Yield,
    Super,
    /// `return`, `break`, `next`
    Jump,
    /// Several statements, or none.
    Statements,
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Call(call) => call.span,
            Expr::Other(other) => other.span,
        }
    }

    pub fn as_call(&self) -> Option<&Call> {
        match self {
            Expr::Call(call) => Some(call),
            Expr::Other(_) => None,
        }
    }

    /// Calls applied along the receiver path, outermost-last.
    pub fn chain(&self) -> Vec<&Call> {
        let mut calls = Vec::new();
        let mut current = self;
        while let Expr::Call(call) = current {
            calls.push(call);
            match call.receiver.as_deref() {
                Some(receiver) => current = receiver,
                None => break,
            }
        }
        calls.reverse();
        calls
    }
}

impl Call {
    pub fn receiver(&self) -> Option<&Expr> {
        self.receiver.as_deref()
    }
}

/// One parsed marker expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RubyExpr {
    root: Expr,
    block_opener: bool,
}

impl RubyExpr {
    /// Parse the code of one marker. A trailing block opener is dropped first.
    pub fn parse(code: &str) -> Result<Self, ParseError> {
        let (code, block_opener) = strip_block_opener(code);
        let mut root = parser::parse(&code)?;
        if block_opener && let Expr::Other(Other { kind: OtherKind::Identifier(name), span }) = &root {
            root = Expr::Call(Call {
                method: name.clone(),
                receiver: None,
                arguments: Vec::new(),
                safe_navigation: false,
                has_block: true,
                span: *span,
            });
        } else if block_opener && let Expr::Call(call) = &mut root {
            call.has_block = true;
        }
        Ok(Self { root, block_opener })
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    /// The code ended with `do`, `{` or `do |args|`.
    pub fn has_block_opener(&self) -> bool {
        self.block_opener
    }

    pub fn calls(&self) -> Vec<&Call> {
        self.root.chain()
    }
}

/// Drop a trailing block opener. `foo(x)do` keeps its closing parenthesis.
pub(crate) fn strip_block_opener(code: &str) -> (String, bool) {
    let Some(captures) = BLOCK_OPENER.captures(code) else {
        return (code.to_string(), false);
    };
    let Some(whole) = captures.get(0) else {
        return (code.to_string(), false);
    };
    let mut stripped = code[..whole.start()].to_string();
    if captures.get(2).is_some_and(|m| m.as_str() == ")") {
        stripped.push(')');
    }
    (stripped, true)
}
