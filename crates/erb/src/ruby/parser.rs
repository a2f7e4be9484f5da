//! Recursive-descent parser over the lexemes of one marker.
//!
//! Precedence, lowest first: statement modifiers, `and`/`or`, `not`,
//! assignment, `?:`, ranges, `||`, `&&`, equality, comparison, `|` `^`, `&`,
//! shifts, additive, multiplicative, unary minus, `**`, `!` `~` unary plus,
//! postfix (`.`, `&.`, `::`, `[]`, blocks), primaries.
//!
//! Whether an identifier followed by a space starts a command call
//! (`raw value`, `link_to "x", path`) depends on the next lexeme and its
//! spacing, as in Ruby. Names assigned earlier in the same code or bound as
//! block parameters are local variables and never take command arguments.

use std::collections::HashSet;

use super::lexer::{Lexeme, PercentKind, Token, lex};
use super::{Call, Expr, Other, OtherKind, ParseError};
use crate::span::Span;

/// Bound on syntactic nesting so hostile input cannot exhaust the stack.
const MAX_DEPTH: usize = 128;

/// Bound on receivers built by chaining loops (`a.b.c`, `a + b + c`), which
/// nest the tree without recursing in the parser.
const MAX_LINKS: usize = 1024;

pub(super) fn parse(code: &str) -> Result<Expr, ParseError> {
    let tokens = lex(code)?;
    let mut parser = Parser {
        code,
        tokens,
        pos: 0,
        locals: HashSet::new(),
        no_do: 0,
        depth: 0,
        links: 0,
    };
    parser.program()
}

fn other(kind: OtherKind, span: Span) -> Expr {
    Expr::Other(Other { kind, span })
}

fn binary_precedence(token: Token) -> Option<u8> {
    Some(match token {
        Token::DotDot | Token::DotDotDot => 1,
        Token::OrOr => 2,
        Token::AndAnd => 3,
        Token::Spaceship
        | Token::Eq
        | Token::CaseEq
        | Token::NotEq
        | Token::Match
        | Token::NotMatch => 4,
        Token::Lt | Token::LtEq | Token::Gt | Token::GtEq => 5,
        Token::Pipe | Token::Caret => 6,
        Token::Amp => 7,
        Token::Shl | Token::Shr => 8,
        Token::Plus | Token::Minus => 9,
        Token::Star | Token::Slash | Token::Modulo => 10,
        _ => return None,
    })
}

fn is_assignable(expr: &Expr) -> bool {
    match expr {
        Expr::Other(other) => matches!(
            other.kind,
            OtherKind::Identifier(_)
                | OtherKind::Constant(_)
                | OtherKind::InstanceVariable(_)
                | OtherKind::ClassVariable(_)
                | OtherKind::GlobalVariable(_)
        ),
        Expr::Call(call) => call.receiver.is_some(),
    }
}

enum Argument {
    Positional(Expr),
    /// `key: value` or `key => value`; collected into one trailing hash.
    Pair(Span),
}

struct Parser<'c> {
    code: &'c str,
    tokens: Vec<Lexeme>,
    pos: usize,
    locals: HashSet<String>,
    /// Non-zero inside command arguments written without parentheses, where a
    /// `do` block belongs to the command rather than the last argument.
    no_do: usize,
    depth: usize,
    links: usize,
}

impl<'c> Parser<'c> {
    fn peek(&self) -> Option<Lexeme> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<Lexeme> {
        self.tokens.get(self.pos + n).copied()
    }

    fn peek_token(&self) -> Option<Token> {
        self.peek().map(|lexeme| lexeme.token)
    }

    fn at(&self, token: Token) -> bool {
        self.peek_token() == Some(token)
    }

    /// Current lexeme is `token` and touches the previous one.
    fn at_adjacent(&self, token: Token) -> bool {
        self.peek()
            .is_some_and(|lexeme| lexeme.token == token && !lexeme.space_before)
    }

    fn bump(&mut self) -> Option<Lexeme> {
        let lexeme = self.peek()?;
        self.pos += 1;
        Some(lexeme)
    }

    fn eat(&mut self, token: Token) -> Option<Lexeme> {
        if self.at(token) { self.bump() } else { None }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<Lexeme, ParseError> {
        match self.eat(token) {
            Some(lexeme) => Ok(lexeme),
            None => Err(self.error(format!("expected {what}"))),
        }
    }

    fn text(&self, lexeme: Lexeme) -> &'c str {
        lexeme.span.slice(self.code)
    }

    fn last_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|index| self.tokens.get(index))
            .map_or(0, |lexeme| lexeme.span.end)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let message = message.into();
        match self.peek() {
            Some(lexeme) => self.unexpected_with(lexeme, &message),
            None => ParseError::new(format!("{message}, found end of input"), self.code.len()),
        }
    }

    fn unexpected_with(&self, lexeme: Lexeme, message: &str) -> ParseError {
        let found = match lexeme.token {
            Token::Newline => "end of line".to_string(),
            _ => format!("'{}'", self.text(lexeme)),
        };
        ParseError::new(format!("{message}, found {found}"), lexeme.span.start)
    }

    fn unexpected(&self, lexeme: Lexeme) -> ParseError {
        self.unexpected_with(lexeme, "unexpected token")
    }

    fn skip_newlines(&mut self) {
        while self.at(Token::Newline) {
            self.pos += 1;
        }
    }

    fn skip_terminators(&mut self) {
        while matches!(self.peek_token(), Some(Token::Newline | Token::Semicolon)) {
            self.pos += 1;
        }
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("expression is nested too deeply"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn link(&mut self) -> Result<(), ParseError> {
        if self.links >= MAX_LINKS {
            return Err(self.error("expression is nested too deeply"));
        }
        self.links += 1;
        Ok(())
    }

    /// Run `f` with `do` blocks allowed again, as inside brackets.
    fn bracketed<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let saved = std::mem::take(&mut self.no_do);
        let result = self.nested(f);
        self.no_do = saved;
        result
    }

    fn program(&mut self) -> Result<Expr, ParseError> {
        let statements = self.statements(&[])?;
        if let Some(lexeme) = self.peek() {
            return Err(self.unexpected(lexeme));
        }
        Ok(collapse(statements, Span::new(0, self.code.len())))
    }

    /// Statements separated by newlines or `;`, up to one of `terminators`
    /// (not consumed) or the end of input.
    fn statements(&mut self, terminators: &[Token]) -> Result<Vec<Expr>, ParseError> {
        let mut out = Vec::new();
        loop {
            self.skip_terminators();
            match self.peek() {
                None => break,
                Some(lexeme) if terminators.contains(&lexeme.token) => break,
                Some(_) => out.push(self.statement()?),
            }
            match self.peek() {
                None => break,
                Some(lexeme) if matches!(lexeme.token, Token::Newline | Token::Semicolon) => {}
                Some(lexeme) if terminators.contains(&lexeme.token) => break,
                Some(lexeme) => return Err(self.unexpected(lexeme)),
            }
        }
        Ok(out)
    }

    fn statement(&mut self) -> Result<Expr, ParseError> {
        self.nested(|p| {
            let mut expr = p.logical()?;
            while matches!(
                p.peek_token(),
                Some(Token::If | Token::Unless | Token::While | Token::Until | Token::Rescue)
            ) {
                p.bump();
                let condition = p.logical()?;
                expr = other(OtherKind::Conditional, expr.span().join(condition.span()));
            }
            Ok(expr)
        })
    }

    /// `and` / `or`
    fn logical(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.negation()?;
        loop {
            let kind = match self.peek_token() {
                Some(Token::And) => OtherKind::And,
                Some(Token::Or) => OtherKind::Or,
                _ => break,
            };
            self.bump();
            self.skip_newlines();
            let right = self.negation()?;
            left = other(kind, left.span().join(right.span()));
        }
        Ok(left)
    }

    fn negation(&mut self) -> Result<Expr, ParseError> {
        let Some(keyword) = self.eat(Token::Not) else {
            return self.expression();
        };
        let operand = self.nested(|p| p.negation())?;
        Ok(Expr::Call(Call {
            method: "!".to_string(),
            span: keyword.span.join(operand.span()),
            receiver: Some(Box::new(operand)),
            arguments: Vec::new(),
            safe_navigation: false,
            has_block: false,
        }))
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.nested(|p| p.assignment())
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.ternary()?;
        if !matches!(self.peek_token(), Some(Token::Assign | Token::OpAssign))
            || !is_assignable(&target)
        {
            return Ok(target);
        }
        self.bump();
        self.skip_newlines();
        if let Expr::Other(Other {
            kind: OtherKind::Identifier(name),
            ..
        }) = &target
        {
            self.locals.insert(name.clone());
        }
        let value = self.expression()?;
        Ok(other(
            OtherKind::Assignment,
            target.span().join(value.span()),
        ))
    }

    fn ternary(&mut self) -> Result<Expr, ParseError> {
        let condition = self.binary(0)?;
        if self.eat(Token::Question).is_none() {
            return Ok(condition);
        }
        self.skip_newlines();
        self.nested(|p| p.ternary())?;
        self.skip_newlines();
        self.expect(Token::Colon, "':' in conditional expression")?;
        self.skip_newlines();
        let otherwise = self.nested(|p| p.ternary())?;
        Ok(other(
            OtherKind::Ternary,
            condition.span().join(otherwise.span()),
        ))
    }

    fn binary(&mut self, min: u8) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let Some(op) = self.peek() else { break };
            let Some(precedence) = binary_precedence(op.token) else {
                break;
            };
            if precedence < min {
                break;
            }
            self.link()?;
            self.bump();
            self.skip_newlines();
            let endless_range = matches!(op.token, Token::DotDot | Token::DotDotDot)
                && !self.starts_operand();
            let right = if endless_range {
                None
            } else {
                Some(self.nested(|p| p.binary(precedence + 1))?)
            };
            let span = match &right {
                Some(right) => left.span().join(right.span()),
                None => left.span().join(op.span),
            };
            left = match (op.token, right) {
                (Token::DotDot | Token::DotDotDot, _) => other(OtherKind::Range, span),
                (Token::OrOr, _) => other(OtherKind::Or, span),
                (Token::AndAnd, _) => other(OtherKind::And, span),
                (_, right) => Expr::Call(Call {
                    method: self.text(op).to_string(),
                    receiver: Some(Box::new(left)),
                    arguments: right.into_iter().collect(),
                    safe_navigation: false,
                    has_block: false,
                    span,
                }),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let Some(op) = self.peek() else {
            return Err(self.error("expected expression"));
        };
        let method = match op.token {
            Token::Bang => "!",
            Token::Tilde => "~",
            Token::Minus => "-@",
            Token::Plus => "+@",
            _ => return self.power(),
        };
        self.bump();
        let operand = self.nested(|p| p.unary())?;
        let span = op.span.join(operand.span());
        if let Expr::Other(Other {
            kind: kind @ (OtherKind::Integer | OtherKind::Float),
            ..
        }) = &operand
            && matches!(op.token, Token::Minus | Token::Plus)
        {
            return Ok(other(kind.clone(), span));
        }
        Ok(Expr::Call(Call {
            method: method.to_string(),
            receiver: Some(Box::new(operand)),
            arguments: Vec::new(),
            safe_navigation: false,
            has_block: false,
            span,
        }))
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.postfix()?;
        if self.eat(Token::Pow).is_none() {
            return Ok(base);
        }
        self.skip_newlines();
        let exponent = self.nested(|p| p.unary())?;
        Ok(Expr::Call(Call {
            method: "**".to_string(),
            span: base.span().join(exponent.span()),
            receiver: Some(Box::new(base)),
            arguments: vec![exponent],
            safe_navigation: false,
            has_block: false,
        }))
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.at(Token::Newline) && self.continues_on_next_line() {
                self.skip_newlines();
            }
            let Some(lexeme) = self.peek() else { break };
            if matches!(
                lexeme.token,
                Token::Dot
                    | Token::SafeNav
                    | Token::Scope
                    | Token::LBracket
                    | Token::LBrace
                    | Token::Do
            ) {
                self.link()?;
            }
            expr = match lexeme.token {
                Token::Dot | Token::SafeNav => {
                    self.bump();
                    self.skip_newlines();
                    self.method_call(expr, lexeme.token == Token::SafeNav)?
                }
                Token::Scope => {
                    self.bump();
                    self.scoped(expr)?
                }
                Token::LBracket => self.index(expr)?,
                Token::LBrace if self.accepts_block(&expr) => {
                    self.bump();
                    let end = self.block_body(Token::RBrace, "'}'")?;
                    with_block(expr, end)
                }
                Token::Do if self.no_do == 0 && self.accepts_block(&expr) => {
                    self.bump();
                    let end = self.block_body(Token::End, "'end'")?;
                    with_block(expr, end)
                }
                _ => break,
            };
        }
        Ok(expr)
    }

    /// A method chain continued with a leading `.` on a later line.
    fn continues_on_next_line(&self) -> bool {
        self.tokens[self.pos..]
            .iter()
            .find(|lexeme| lexeme.token != Token::Newline)
            .is_some_and(|lexeme| matches!(lexeme.token, Token::Dot | Token::SafeNav))
    }

    fn accepts_block(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Call(_) => true,
            Expr::Other(Other {
                kind: OtherKind::Identifier(name),
                ..
            }) => !self.locals.contains(name),
            Expr::Other(Other {
                kind: OtherKind::Super | OtherKind::Yield,
                ..
            }) => true,
            Expr::Other(_) => false,
        }
    }

    /// Appends an adjacent `?` or `!` to a method name.
    fn method_name(&mut self, name: Lexeme) -> String {
        let mut method = self.text(name).to_string();
        if (self.at_adjacent(Token::Question) || self.at_adjacent(Token::Bang))
            && let Some(suffix) = self.bump()
        {
            method.push_str(self.text(suffix));
        }
        method
    }

    fn method_call(&mut self, receiver: Expr, safe_navigation: bool) -> Result<Expr, ParseError> {
        let method = match self.peek() {
            Some(name) if name.token.is_name() => {
                self.bump();
                self.method_name(name)
            }
            // `callable.(args)`
            Some(lexeme) if lexeme.token == Token::LParen => "call".to_string(),
            _ => return Err(self.error("expected method name")),
        };
        let arguments = self.call_arguments()?.unwrap_or_default();
        Ok(Expr::Call(Call {
            method,
            span: Span::new(receiver.span().start, self.last_end()),
            receiver: Some(Box::new(receiver)),
            arguments,
            safe_navigation,
            has_block: false,
        }))
    }

    /// `Foo::Bar` extends a constant path; `Foo::bar` and `Foo::Bar()` are calls.
    fn scoped(&mut self, scope: Expr) -> Result<Expr, ParseError> {
        let Some(name) = self.peek() else {
            return Err(self.error("expected name after '::'"));
        };
        let is_constant = name.token == Token::Constant
            && !self
                .peek_at(1)
                .is_some_and(|next| next.token == Token::LParen && !next.space_before);
        if !is_constant {
            return self.method_call(scope, false);
        }
        self.bump();
        let path = match &scope {
            Expr::Other(Other {
                kind: OtherKind::Constant(path),
                ..
            }) => format!("{path}::{}", self.text(name)),
            _ => self.text(name).to_string(),
        };
        Ok(other(OtherKind::Constant(path), scope.span().join(name.span)))
    }

    fn index(&mut self, receiver: Expr) -> Result<Expr, ParseError> {
        self.bump();
        let arguments = self.bracketed(|p| p.argument_list(Some(Token::RBracket)))?;
        let close = self.expect(Token::RBracket, "']'")?;
        Ok(Expr::Call(Call {
            method: "[]".to_string(),
            span: receiver.span().join(close.span),
            receiver: Some(Box::new(receiver)),
            arguments,
            safe_navigation: false,
            has_block: false,
        }))
    }

    /// Parameters and statements of a block whose opener was just consumed.
    /// Returns the end offset of the closing token.
    fn block_body(&mut self, close: Token, what: &str) -> Result<usize, ParseError> {
        self.skip_newlines();
        if self.eat(Token::OrOr).is_none() && self.at(Token::Pipe) {
            self.block_parameters()?;
        }
        self.bracketed(|p| p.statements(&[close]))?;
        Ok(self.expect(close, what)?.span.end)
    }

    fn block_parameters(&mut self) -> Result<(), ParseError> {
        self.bump();
        loop {
            match self.bump() {
                Some(lexeme) if lexeme.token == Token::Pipe => return Ok(()),
                Some(lexeme) if lexeme.token == Token::Ident => {
                    self.locals.insert(self.text(lexeme).to_string());
                }
                Some(_) => {}
                None => return Err(self.error("unterminated block parameters")),
            }
        }
    }

    /// Arguments of a call: parenthesized when `(` touches the name, command
    /// arguments when the next lexeme can only start an argument, otherwise none.
    fn call_arguments(&mut self) -> Result<Option<Vec<Expr>>, ParseError> {
        if self.at_adjacent(Token::LParen) {
            self.bump();
            let arguments = self.bracketed(|p| p.argument_list(Some(Token::RParen)))?;
            self.expect(Token::RParen, "')'")?;
            return Ok(Some(arguments));
        }
        if self.starts_command_argument() {
            self.no_do += 1;
            let arguments = self.nested(|p| p.argument_list(None));
            self.no_do -= 1;
            return arguments.map(Some);
        }
        Ok(None)
    }

    fn argument_list(&mut self, close: Option<Token>) -> Result<Vec<Expr>, ParseError> {
        let mut arguments = Vec::new();
        let mut pairs: Option<Span> = None;
        loop {
            if let Some(close) = close {
                self.skip_newlines();
                if self.at(close) {
                    break;
                }
            }
            match self.argument()? {
                Argument::Positional(expr) => arguments.push(expr),
                Argument::Pair(span) => pairs = Some(pairs.map_or(span, |all| all.join(span))),
            }
            if close.is_some() {
                self.skip_newlines();
            }
            if self.eat(Token::Comma).is_none() {
                break;
            }
            self.skip_newlines();
        }
        if let Some(span) = pairs {
            arguments.push(other(OtherKind::Hash, span));
        }
        Ok(arguments)
    }

    fn argument(&mut self) -> Result<Argument, ParseError> {
        let Some(first) = self.peek() else {
            return Err(self.error("expected argument"));
        };
        if matches!(first.token, Token::Star | Token::Pow | Token::Amp) {
            self.bump();
            let kind = if first.token == Token::Amp {
                OtherKind::BlockPass
            } else {
                OtherKind::Splat
            };
            let end = if self.starts_operand() {
                self.expression()?.span().end
            } else {
                first.span.end
            };
            let expr = other(kind, Span::new(first.span.start, end));
            return Ok(if first.token == Token::Pow {
                Argument::Pair(expr.span())
            } else {
                Argument::Positional(expr)
            });
        }
        if self.at_label() {
            self.bump();
            self.bump();
            self.skip_newlines();
            // `f(key:)` omits the value.
            let end = if self.starts_operand() {
                self.expression()?.span().end
            } else {
                self.last_end()
            };
            return Ok(Argument::Pair(Span::new(first.span.start, end)));
        }
        let expr = self.expression()?;
        if self.eat(Token::Rocket).is_some() {
            self.skip_newlines();
            let value = self.expression()?;
            return Ok(Argument::Pair(expr.span().join(value.span())));
        }
        Ok(Argument::Positional(expr))
    }

    /// `name:` or `"name":` used as a hash key.
    fn at_label(&self) -> bool {
        let (Some(name), Some(colon)) = (self.peek(), self.peek_at(1)) else {
            return false;
        };
        (name.token.is_name() || name.token == Token::String)
            && colon.token == Token::Colon
            && !colon.space_before
    }

    /// The lexeme after a colon that makes it a symbol literal.
    fn symbol_follows(&self, colon_index: usize) -> bool {
        self.tokens.get(colon_index + 1).is_some_and(|next| {
            !next.space_before
                && (next.token.is_name()
                    || matches!(
                        next.token,
                        Token::String
                            | Token::InstanceVariable
                            | Token::ClassVariable
                            | Token::GlobalVariable
                    ))
        })
    }

    /// Can the current lexeme begin an expression?
    fn starts_operand(&self) -> bool {
        let Some(lexeme) = self.peek() else {
            return false;
        };
        match lexeme.token {
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
            | Token::Nil
            | Token::True
            | Token::False
            | Token::SelfKw
            | Token::Not
            | Token::Defined
            | Token::Super
            | Token::Yield
            | Token::Arrow
            | Token::Scope
            | Token::LParen
            | Token::LBracket
            | Token::LBrace
            | Token::Bang
            | Token::Tilde
            | Token::Minus
            | Token::Plus
            | Token::Star
            | Token::Pow
            | Token::Amp
            | Token::DotDot
            | Token::DotDotDot => true,
            Token::Colon => self.symbol_follows(self.pos),
            _ => false,
        }
    }

    /// After a method name and a space: does the next lexeme begin the first
    /// argument of a command call?
    fn starts_command_argument(&self) -> bool {
        let Some(lexeme) = self.peek() else {
            return false;
        };
        if !lexeme.space_before {
            return false;
        }
        let touches_next = self
            .peek_at(1)
            .is_some_and(|next| !next.space_before && next.token != Token::Newline);
        match lexeme.token {
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
            | Token::Nil
            | Token::True
            | Token::False
            | Token::SelfKw
            | Token::Not
            | Token::Defined
            | Token::Super
            | Token::Yield
            | Token::Arrow
            | Token::LParen
            | Token::LBracket
            | Token::Bang => true,
            Token::Minus
            | Token::Star
            | Token::Pow
            | Token::Amp
            | Token::Tilde
            | Token::Scope
            | Token::DotDot
            | Token::DotDotDot => touches_next,
            Token::Colon => self.symbol_follows(self.pos),
            _ => false,
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let Some(lexeme) = self.bump() else {
            return Err(self.error("expected expression"));
        };
        let kind = match lexeme.token {
            Token::Integer => OtherKind::Integer,
            Token::Float => OtherKind::Float,
            Token::String => return Ok(self.string(lexeme)),
            Token::Regexp => OtherKind::Regexp,
            Token::Percent(PercentKind::String) => OtherKind::String,
            Token::Percent(PercentKind::Array) => OtherKind::Array,
            Token::Percent(PercentKind::Symbol) => OtherKind::Symbol,
            Token::Nil => OtherKind::Nil,
            Token::True => OtherKind::True,
            Token::False => OtherKind::False,
            Token::SelfKw => OtherKind::SelfRef,
            Token::InstanceVariable => OtherKind::InstanceVariable(self.text(lexeme).to_string()),
            Token::ClassVariable => OtherKind::ClassVariable(self.text(lexeme).to_string()),
            Token::GlobalVariable => OtherKind::GlobalVariable(self.text(lexeme).to_string()),
            Token::Ident => return self.identifier(lexeme),
            Token::Constant => return self.constant(lexeme),
            Token::Scope => {
                let name = self.expect(Token::Constant, "constant after '::'")?;
                return Ok(other(
                    OtherKind::Constant(self.text(name).to_string()),
                    lexeme.span.join(name.span),
                ));
            }
            Token::Colon => return self.symbol(lexeme),
            Token::LParen => return self.parenthesized(lexeme),
            Token::LBracket => {
                self.bracketed(|p| p.argument_list(Some(Token::RBracket)))?;
                let close = self.expect(Token::RBracket, "']'")?;
                return Ok(other(OtherKind::Array, lexeme.span.join(close.span)));
            }
            Token::LBrace => return self.hash(lexeme),
            Token::Arrow => return self.lambda(lexeme),
            Token::Defined => {
                let operand = self.nested(|p| p.unary())?;
                return Ok(other(OtherKind::Defined, lexeme.span.join(operand.span())));
            }
            Token::Yield | Token::Super => {
                self.call_arguments()?;
                let kind = if lexeme.token == Token::Yield {
                    OtherKind::Yield
                } else {
                    OtherKind::Super
                };
                return Ok(other(kind, Span::new(lexeme.span.start, self.last_end())));
            }
            Token::Return | Token::Break | Token::Next => {
                if self.starts_operand() {
                    self.expression()?;
                }
                return Ok(other(
                    OtherKind::Jump,
                    Span::new(lexeme.span.start, self.last_end()),
                ));
            }
            Token::If | Token::Unless => return self.conditional(lexeme),
            Token::Not => {
                let operand = self.expression()?;
                return Ok(Expr::Call(Call {
                    method: "!".to_string(),
                    span: lexeme.span.join(operand.span()),
                    receiver: Some(Box::new(operand)),
                    arguments: Vec::new(),
                    safe_navigation: false,
                    has_block: false,
                }));
            }
            Token::DotDot | Token::DotDotDot => {
                let end = self.nested(|p| p.unary())?;
                return Ok(other(OtherKind::Range, lexeme.span.join(end.span())));
            }
            _ => return Err(self.unexpected(lexeme)),
        };
        Ok(other(kind, lexeme.span))
    }

    /// Adjacent literals concatenate: `"a" 'b'`.
    fn string(&mut self, first: Lexeme) -> Expr {
        let mut span = first.span;
        while let Some(next) = self.eat(Token::String) {
            span = span.join(next.span);
        }
        other(OtherKind::String, span)
    }

    fn identifier(&mut self, name: Lexeme) -> Result<Expr, ParseError> {
        let method = self.method_name(name);
        let suffixed = method.len() > name.span.len();
        let local = !suffixed && self.locals.contains(&method);
        let arguments = if local && !self.at_adjacent(Token::LParen) {
            None
        } else {
            self.call_arguments()?
        };
        let span = Span::new(name.span.start, self.last_end());
        Ok(match arguments {
            Some(arguments) => Expr::Call(Call {
                method,
                receiver: None,
                arguments,
                safe_navigation: false,
                has_block: false,
                span,
            }),
            None if suffixed => Expr::Call(Call {
                method,
                receiver: None,
                arguments: Vec::new(),
                safe_navigation: false,
                has_block: false,
                span,
            }),
            None => other(OtherKind::Identifier(method), span),
        })
    }

    /// `Foo` is a constant; `Foo(x)` calls the method `Foo`.
    fn constant(&mut self, name: Lexeme) -> Result<Expr, ParseError> {
        if !self.at_adjacent(Token::LParen) {
            return Ok(other(
                OtherKind::Constant(self.text(name).to_string()),
                name.span,
            ));
        }
        let arguments = self.call_arguments()?.unwrap_or_default();
        Ok(Expr::Call(Call {
            method: self.text(name).to_string(),
            receiver: None,
            arguments,
            safe_navigation: false,
            has_block: false,
            span: Span::new(name.span.start, self.last_end()),
        }))
    }

    fn symbol(&mut self, colon: Lexeme) -> Result<Expr, ParseError> {
        if !self.symbol_follows(self.pos - 1) {
            return Err(self.unexpected(colon));
        }
        if let Some(name) = self.bump()
            && name.token.is_name()
        {
            self.method_name(name);
        }
        Ok(other(
            OtherKind::Symbol,
            Span::new(colon.span.start, self.last_end()),
        ))
    }

    fn parenthesized(&mut self, open: Lexeme) -> Result<Expr, ParseError> {
        let statements = self.bracketed(|p| p.statements(&[Token::RParen]))?;
        let close = self.expect(Token::RParen, "')'")?;
        Ok(collapse(statements, open.span.join(close.span)))
    }

    fn hash(&mut self, open: Lexeme) -> Result<Expr, ParseError> {
        self.bracketed(|p| {
            loop {
                p.skip_newlines();
                if p.at(Token::RBrace) {
                    break;
                }
                if let Argument::Positional(expr) = p.argument()? {
                    return Err(ParseError::new(
                        "expected 'key => value' or 'key: value' in hash literal",
                        expr.span().start,
                    ));
                }
                p.skip_newlines();
                if p.eat(Token::Comma).is_none() {
                    break;
                }
            }
            Ok(())
        })?;
        let close = self.expect(Token::RBrace, "'}'")?;
        Ok(other(OtherKind::Hash, open.span.join(close.span)))
    }

    /// `->(x) { ... }`, `-> x do ... end`
    fn lambda(&mut self, arrow: Lexeme) -> Result<Expr, ParseError> {
        if self.eat(Token::LParen).is_some() {
            loop {
                match self.bump() {
                    Some(lexeme) if lexeme.token == Token::RParen => break,
                    Some(lexeme) if lexeme.token == Token::Ident => {
                        self.locals.insert(self.text(lexeme).to_string());
                    }
                    Some(_) => {}
                    None => return Err(self.error("unterminated lambda parameters")),
                }
            }
        } else {
            while let Some(param) = self.eat(Token::Ident) {
                self.locals.insert(self.text(param).to_string());
                if self.eat(Token::Comma).is_none() {
                    break;
                }
            }
        }
        let end = if self.eat(Token::LBrace).is_some() {
            self.block_body(Token::RBrace, "'}'")?
        } else if self.eat(Token::Do).is_some() {
            self.block_body(Token::End, "'end'")?
        } else {
            return Err(self.error("expected lambda body"));
        };
        Ok(other(OtherKind::Lambda, Span::new(arrow.span.start, end)))
    }

    /// `if`/`unless` used as an expression, through its `end`.
    fn conditional(&mut self, keyword: Lexeme) -> Result<Expr, ParseError> {
        self.nested(|p| {
            loop {
                p.logical()?;
                p.eat(Token::Then);
                p.statements(&[Token::Elsif, Token::Else, Token::End])?;
                match p.peek_token() {
                    Some(Token::Elsif) => {
                        p.bump();
                    }
                    Some(Token::Else) => {
                        p.bump();
                        p.statements(&[Token::End])?;
                        let end = p.expect(Token::End, "'end'")?;
                        return Ok(other(
                            OtherKind::Conditional,
                            keyword.span.join(end.span),
                        ));
                    }
                    _ => {
                        let end = p.expect(Token::End, "'end'")?;
                        return Ok(other(
                            OtherKind::Conditional,
                            keyword.span.join(end.span),
                        ));
                    }
                }
            }
        })
    }
}

fn collapse(mut statements: Vec<Expr>, span: Span) -> Expr {
    if statements.len() == 1
        && let Some(only) = statements.pop()
    {
        return only;
    }
    other(OtherKind::Statements, span)
}

/// Attach a block to a call; a bare name with a block is a receiverless call.
fn with_block(target: Expr, end: usize) -> Expr {
    match target {
        Expr::Call(mut call) => {
            call.has_block = true;
            call.span = Span::new(call.span.start, end);
            Expr::Call(call)
        }
        Expr::Other(Other {
            kind: OtherKind::Identifier(method),
            span,
        }) => Expr::Call(Call {
            method,
            receiver: None,
            arguments: Vec::new(),
            safe_navigation: false,
            has_block: true,
            span: Span::new(span.start, end),
        }),
        Expr::Other(other) => Expr::Other(Other {
            span: Span::new(other.span.start, end),
            ..other
        }),
    }
}
