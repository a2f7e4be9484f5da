//! Lexical context classification.
//!
//! The tokenizer threads one [`ScanState`] through a run and asks [`classify`]
//! for the context of every marker it meets. The rule engine and the compiler
//! read the stored [`Context`] back from the token, so both share this single
//! source of truth.

use std::fmt;

/// Elements whose body is not re-parsed as markup.
pub const RAWTEXT_ELEMENTS: &[&str] = &[
    "title", "textarea", "style", "xmp", "iframe", "noembed", "noframes",
];

pub fn is_rawtext_element(name: &str) -> bool {
    RAWTEXT_ELEMENTS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// Where a marker sits relative to the surrounding markup.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Context {
    TagName,
    AttributeName,
    AttributeValueQuoted(char),
    AttributeValueUnquoted,
    /// Inside a tag, between attributes.
    TagBody,
    Comment,
    CData,
    RawTextBody(String),
    ScriptBody,
    Text,
}

impl Context {
    /// `true` for every context inside `<...>`.
    pub fn is_inside_tag(&self) -> bool {
        matches!(
            self,
            Context::TagName
                | Context::AttributeName
                | Context::AttributeValueQuoted(_)
                | Context::AttributeValueUnquoted
                | Context::TagBody
        )
    }

    pub fn is_attribute_value(&self) -> bool {
        matches!(
            self,
            Context::AttributeValueQuoted(_) | Context::AttributeValueUnquoted
        )
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Context::TagName => f.write_str("tag name"),
            Context::AttributeName => f.write_str("attribute name"),
            Context::AttributeValueQuoted(quote) => write!(f, "attribute value ({quote})"),
            Context::AttributeValueUnquoted => f.write_str("unquoted attribute value"),
            Context::TagBody => f.write_str("tag"),
            Context::Comment => f.write_str("html comment"),
            Context::CData => f.write_str("cdata"),
            Context::RawTextBody(name) => write!(f, "{name} tag"),
            Context::ScriptBody => f.write_str("script tag"),
            Context::Text => f.write_str("text"),
        }
    }
}

/// Markup scanner states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScanMode {
    Data,
    /// After `<` when a marker follows immediately.
    TagOpen,
    /// After `</` when a marker follows immediately.
    EndTagOpen,
    TagName,
    BeforeAttributeName,
    AttributeName,
    AfterAttributeName,
    BeforeAttributeValue,
    AttributeValueDoubleQuoted,
    AttributeValueSingleQuoted,
    AttributeValueUnquoted,
    AfterAttributeValueQuoted,
    SelfClosingStartTag,
    Comment,
    CData,
    RawText,
    ScriptData,
}

/// Scan state owned by a single tokenizer run.
#[derive(Clone, Debug)]
pub(crate) struct ScanState {
    pub(crate) mode: ScanMode,
    /// Lowercased name of the rawtext/script element whose body is being scanned.
    pub(crate) body_element: Option<String>,
}

impl ScanState {
    pub(crate) fn new(mode: ScanMode) -> Self {
        Self {
            mode,
            body_element: None,
        }
    }
}

/// Context of a marker met in `state`. Pure; no side effects.
pub(crate) fn classify(state: &ScanState) -> Context {
    match state.mode {
        ScanMode::Data => Context::Text,
        ScanMode::TagOpen | ScanMode::EndTagOpen | ScanMode::TagName => Context::TagName,
        ScanMode::AttributeName => Context::AttributeName,
        ScanMode::BeforeAttributeName
        | ScanMode::AfterAttributeName
        | ScanMode::AfterAttributeValueQuoted
        | ScanMode::SelfClosingStartTag => Context::TagBody,
        // A marker right after `=` starts an unquoted value.
        ScanMode::BeforeAttributeValue | ScanMode::AttributeValueUnquoted => {
            Context::AttributeValueUnquoted
        }
        ScanMode::AttributeValueDoubleQuoted => Context::AttributeValueQuoted('"'),
        ScanMode::AttributeValueSingleQuoted => Context::AttributeValueQuoted('\''),
        ScanMode::Comment => Context::Comment,
        ScanMode::CData => Context::CData,
        ScanMode::RawText => {
            Context::RawTextBody(state.body_element.clone().unwrap_or_default())
        }
        ScanMode::ScriptData => Context::ScriptBody,
    }
}
