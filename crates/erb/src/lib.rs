pub mod compile;
pub mod config;
pub mod context;
pub mod erb;
pub mod report;
pub mod ruby;
pub mod safety;
pub mod snapshot;
pub mod span;
pub mod token;
pub mod tokenizer;

mod entities;

pub use compile::{
    CompileError, CompileOptions, Compiler, Decision, Guard, Interpolation, OutputBuffer, Program,
    RenderError, Scope, Segment, Value,
};
pub use config::{AttributeNameMatcher, Config, ConfigError, SafetyPolicy};
pub use context::Context;
pub use erb::TokenizeError;
pub use report::{SAFETY_TIPS, SafetyReport, assert_erb_safety, format_safety_error};
pub use ruby::{Call, Expr, ParseError, RubyExpr};
pub use safety::{AnalysisError, CheckOptions, Offender, SafetyError, SafetyTester};
pub use span::Span;
pub use token::{
    AttributeToken, Content, Element, ExpressionKind, ExpressionToken, Node, NodeStream, Part,
    TemplateLanguage,
};
pub use tokenizer::tokenize;
