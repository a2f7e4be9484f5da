//! Ruby expression lexer.
//!
//! Raw tokenization is done by `logos`. Whitespace, comments and line
//! continuations are folded into a `space_before` flag on the next lexeme
//! because Ruby call syntax depends on them (`foo -1` vs `foo - 1`).
//! Regexp literals are context sensitive and are scanned by hand once the
//! previous lexeme says a `/` starts an operand.

use logos::Logos;

use super::ParseError;
use crate::span::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PercentKind {
    /// `%()`, `%q()`, `%Q()`
    String,
    /// `%w()`, `%W()`, `%i()`, `%I()`
    Array,
    /// `%s()`
    Symbol,
}

#[derive(Logos, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Token {
    #[regex(r"[ \t\r\f]+")]
    #[regex(r"\\\r?\n")]
    #[regex(r"#[^\n]*")]
    Space,
    #[token("\n")]
    Newline,
    #[token(";")]
    Semicolon,

    #[token("and")]
    And,
    #[token("begin")]
    Begin,
    #[token("break")]
    Break,
    #[token("case")]
    Case,
    #[token("class")]
    Class,
    #[token("def")]
    Def,
    #[token("defined?")]
    Defined,
    #[token("do")]
    Do,
    #[token("else")]
    Else,
    #[token("elsif")]
    Elsif,
    #[token("end")]
    End,
    #[token("false")]
    False,
    #[token("if")]
    If,
    #[token("in")]
    In,
    #[token("module")]
    Module,
    #[token("next")]
    Next,
    #[token("nil")]
    Nil,
    #[token("not")]
    Not,
    #[token("or")]
    Or,
    #[token("rescue")]
    Rescue,
    #[token("return")]
    Return,
    #[token("self")]
    SelfKw,
    #[token("super")]
    Super,
    #[token("then")]
    Then,
    #[token("true")]
    True,
    #[token("unless")]
    Unless,
    #[token("until")]
    Until,
    #[token("when")]
    When,
    #[token("while")]
    While,
    #[token("yield")]
    Yield,

    #[regex(r"[a-z_][A-Za-z0-9_]*")]
    Ident,
    #[regex(r"[A-Z][A-Za-z0-9_]*")]
    Constant,
    #[regex(r"@[A-Za-z_][A-Za-z0-9_]*")]
    InstanceVariable,
    #[regex(r"@@[A-Za-z_][A-Za-z0-9_]*")]
    ClassVariable,
    #[regex(r"\$[A-Za-z_][A-Za-z0-9_]*")]
    #[regex(r"\$[0-9]+")]
    #[regex(r#"\$[!@&`'+~=/\\,;.<>*$?:"]"#)]
    GlobalVariable,

    #[regex(r"[0-9][0-9_]*")]
    #[regex(r"0[xX][0-9a-fA-F_]+")]
    #[regex(r"0[bB][01_]+")]
    Integer,
    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*([eE][+-]?[0-9]+)?")]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9]+")]
    Float,

    #[token("\"", double_quoted)]
    #[token("`", backtick)]
    #[token("'", single_quoted)]
    String,
    #[regex(r"%[qQwWiIs]?[\(\[\{<|!/]", percent_literal)]
    Percent(PercentKind),
    /// Produced by [`lex`] only, never by the raw `logos` pass.
    Regexp,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("&.")]
    SafeNav,
    #[token("::")]
    Scope,
    #[token(":")]
    Colon,
    #[token("?")]
    Question,
    #[token("=>")]
    Rocket,
    #[token("->")]
    Arrow,
    #[token("..")]
    DotDot,
    #[token("...")]
    DotDotDot,
    #[token("=")]
    Assign,
    #[token("+=")]
    #[token("-=")]
    #[token("*=")]
    #[token("/=")]
    #[token("%=")]
    #[token("**=")]
    #[token("||=")]
    #[token("&&=")]
    #[token("|=")]
    #[token("&=")]
    #[token("^=")]
    #[token("<<=")]
    #[token(">>=")]
    OpAssign,
    #[token("==")]
    Eq,
    #[token("===")]
    CaseEq,
    #[token("!=")]
    NotEq,
    #[token("=~")]
    Match,
    #[token("!~")]
    NotMatch,
    #[token("<=>")]
    Spaceship,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    Pow,
    #[token("/")]
    Slash,
    #[token("%")]
    Modulo,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
}

impl Token {
    /// Keywords that may also be used as method names after `.` or as hash labels.
    pub(crate) fn is_keyword(self) -> bool {
        matches!(
            self,
            Token::And
                | Token::Begin
                | Token::Break
                | Token::Case
                | Token::Class
                | Token::Def
                | Token::Do
                | Token::Else
                | Token::Elsif
                | Token::End
                | Token::False
                | Token::If
                | Token::In
                | Token::Module
                | Token::Next
                | Token::Nil
                | Token::Not
                | Token::Or
                | Token::Rescue
                | Token::Return
                | Token::SelfKw
                | Token::Super
                | Token::Then
                | Token::True
                | Token::Unless
                | Token::Until
                | Token::When
                | Token::While
                | Token::Yield
        )
    }

    pub(crate) fn is_name(self) -> bool {
        matches!(self, Token::Ident | Token::Constant) || self.is_keyword()
    }

    /// A `/` after this token starts a regexp literal rather than a division.
    fn expects_operand(self) -> bool {
        !matches!(
            self,
            Token::Ident
                | Token::Constant
                | Token::InstanceVariable
                | Token::ClassVariable
                | Token::GlobalVariable
                | Token::Integer
                | Token::Float
                | Token::String
                | Token::Percent(_)
                | Token::Regexp
                | Token::RParen
                | Token::RBracket
                | Token::RBrace
                | Token::End
                | Token::SelfKw
                | Token::Nil
                | Token::True
                | Token::False
        )
    }
}

/// Byte length of a quoted body up to and including the closing delimiter.
///
/// `open` is the nesting opener for bracketed percent literals. With
/// `interpolates`, `#{...}` sections are skipped as balanced code that may
/// itself contain quoted strings.
fn quoted_len(rest: &[u8], open: Option<u8>, close: u8, interpolates: bool) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = 0;
    while i < rest.len() {
        let b = rest[i];
        if b == b'\\' {
            i += 2;
            continue;
        }
        if interpolates && b == b'#' && rest.get(i + 1) == Some(&b'{') {
            i += 2 + interpolation_len(&rest[i + 2..])?;
            continue;
        }
        if Some(b) == open && open != Some(close) {
            depth += 1;
        } else if b == close {
            if depth == 0 {
                return Some(i + 1);
            }
            depth -= 1;
        }
        i += 1;
    }
    None
}

/// Length of `#{...}` code up to and including the closing brace.
fn interpolation_len(rest: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = 0;
    while i < rest.len() {
        match rest[i] {
            b'"' | b'`' => {
                i += 1 + quoted_len(&rest[i + 1..], None, rest[i], true)?;
                continue;
            }
            b'\'' => {
                i += 1 + quoted_len(&rest[i + 1..], None, b'\'', false)?;
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                if depth == 0 {
                    return Some(i + 1);
                }
                depth -= 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn close_quoted(lex: &mut logos::Lexer<Token>, close: u8, interpolates: bool) -> bool {
    match quoted_len(lex.remainder().as_bytes(), None, close, interpolates) {
        Some(len) => {
            lex.bump(len);
            true
        }
        None => false,
    }
}

fn double_quoted(lex: &mut logos::Lexer<Token>) -> bool {
    close_quoted(lex, b'"', true)
}

fn backtick(lex: &mut logos::Lexer<Token>) -> bool {
    close_quoted(lex, b'`', true)
}

fn single_quoted(lex: &mut logos::Lexer<Token>) -> bool {
    close_quoted(lex, b'\'', false)
}

fn percent_literal(lex: &mut logos::Lexer<Token>) -> Option<PercentKind> {
    let head = lex.slice().as_bytes();
    let open = *head.last()?;
    let (kind, interpolates) = match (head.len(), head.get(1).copied()) {
        (3, Some(b'w' | b'i')) => (PercentKind::Array, false),
        (3, Some(b'W' | b'I')) => (PercentKind::Array, true),
        (3, Some(b'q')) => (PercentKind::String, false),
        (3, Some(b's')) => (PercentKind::Symbol, false),
        _ => (PercentKind::String, true),
    };
    let close = match open {
        b'(' => b')',
        b'[' => b']',
        b'{' => b'}',
        b'<' => b'>',
        other => other,
    };
    let len = quoted_len(lex.remainder().as_bytes(), Some(open), close, interpolates)?;
    lex.bump(len);
    Some(kind)
}

/// Length of a regexp literal body after the opening `/`, flags included.
fn regexp_len(rest: &[u8]) -> Option<usize> {
    let mut in_class = false;
    let mut i = 0;
    while i < rest.len() {
        match rest[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'#' if rest.get(i + 1) == Some(&b'{') => {
                i += 2 + interpolation_len(&rest[i + 2..])?;
                continue;
            }
            b'[' => in_class = true,
            b']' => in_class = false,
            b'\n' => return None,
            b'/' if !in_class => {
                let flags = rest[i + 1..]
                    .iter()
                    .take_while(|b| b.is_ascii_lowercase())
                    .count();
                return Some(i + 1 + flags);
            }
            _ => {}
        }
        i += 1;
    }
    None
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Lexeme {
    pub(crate) token: Token,
    pub(crate) span: Span,
    /// Whitespace or a comment directly precedes this lexeme.
    pub(crate) space_before: bool,
}

pub(crate) fn lex(code: &str) -> Result<Vec<Lexeme>, ParseError> {
    let mut lexer = Token::lexer(code);
    let mut out: Vec<Lexeme> = Vec::new();
    let mut space_before = false;
    while let Some(result) = lexer.next() {
        let start = lexer.span().start;
        let token = match result {
            Ok(Token::Space) => {
                space_before = true;
                continue;
            }
            Ok(Token::Slash) if starts_regexp(out.last(), space_before, lexer.remainder()) => {
                let len = regexp_len(lexer.remainder().as_bytes()).ok_or_else(|| {
                    ParseError::new("unterminated regexp literal", start)
                })?;
                lexer.bump(len);
                Token::Regexp
            }
            Ok(Token::Question) => match char_literal_len(out.last(), lexer.remainder()) {
                Some(len) => {
                    lexer.bump(len);
                    Token::String
                }
                None => Token::Question,
            },
            Ok(token) => token,
            Err(()) => {
                let message = match lexer.slice().chars().next() {
                    Some(quote @ ('"' | '\'' | '`')) => format!("unterminated string starting with {quote}"),
                    Some('%') => "unterminated percent literal".to_string(),
                    Some(ch) => format!("unexpected character {ch:?}"),
                    None => "unexpected end of input".to_string(),
                };
                return Err(ParseError::new(message, start));
            }
        };
        let span = lexer.span();
        out.push(Lexeme {
            token,
            span: Span::new(span.start, span.end),
            space_before,
        });
        space_before = false;
    }
    Ok(out)
}

/// `foo /x/` and `(/x/` start a regexp; `a / b` and `a/b` divide.
fn starts_regexp(previous: Option<&Lexeme>, space_before: bool, rest: &str) -> bool {
    match previous {
        None => true,
        Some(prev) if prev.token == Token::Ident => {
            space_before && !rest.starts_with([' ', '\t', '='])
        }
        Some(prev) => prev.token.expects_operand(),
    }
}

/// Bytes after `?` taken by a character literal such as `?a` or `?\n`.
///
/// Only in operand position; after an operand the `?` is a method suffix or
/// starts a conditional. `?ab` is not a literal.
fn char_literal_len(previous: Option<&Lexeme>, rest: &str) -> Option<usize> {
    if !previous.is_none_or(|prev| prev.token.expects_operand()) {
        return None;
    }
    let rest = rest.as_bytes();
    let len = match rest {
        [b'\\', b'u', b'{', tail @ ..] => 3 + tail.iter().position(|&b| b == b'}')? + 1,
        [b'\\', b'u', hex @ ..] => {
            if hex.len() < 4 || !hex[..4].iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            6
        }
        [b'\\', next, ..] => 1 + utf8_len(*next),
        [first, ..] if !first.is_ascii_whitespace() => utf8_len(*first),
        _ => return None,
    };
    let after = rest.get(len..)?;
    if after.first().is_some_and(|&b| b.is_ascii_alphanumeric() || b == b'_') {
        return None;
    }
    Some(len)
}

fn utf8_len(first: u8) -> usize {
    match first {
        0xF0.. => 4,
        0xE0.. => 3,
        0xC0.. => 2,
        _ => 1,
    }
}
