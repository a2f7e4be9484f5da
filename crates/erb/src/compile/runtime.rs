//! Render-time guard for compiled programs.

use tools::{contains_ignore_ascii_case, escape_html};

use super::{Guard, Interpolation};

/// A value produced by evaluating marker code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// Plain string; escaped on output.
    Text(String),
    /// String already marked safe for HTML.
    Safe(String),
    /// Result of the `html_attributes` helper.
    Attributes(Vec<(String, String)>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Text(_) | Value::Safe(_) => "String",
            Value::Attributes(_) => "Attributes",
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("{message}")]
    UnsafeHtml { message: String },
    #[error("{message}")]
    DontInterpolateHere { message: String },
}

/// The host evaluator a program renders against.
pub trait Scope {
    fn evaluate(&mut self, code: &str) -> Value;
    fn execute(&mut self, code: &str);
}

const NAME_BREAKERS: &[char] = &['"', '\'', '=', '<', '>', '/', '`'];

fn breaks_name(text: &str) -> bool {
    text.chars()
        .any(|ch| ch.is_whitespace() || NAME_BREAKERS.contains(&ch))
}

fn unsafe_html(interpolation: &Interpolation) -> RenderError {
    RenderError::UnsafeHtml {
        message: format!(
            "Detected invalid characters as part of the interpolation into a {} around: {}.",
            interpolation.guard, interpolation.around
        ),
    }
}

#[derive(Debug, Default)]
pub struct OutputBuffer {
    out: String,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_literal(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub fn as_str(&self) -> &str {
        &self.out
    }

    pub fn into_string(self) -> String {
        self.out
    }

    /// Append `value` under the guard of `interpolation`.
    pub fn append(&mut self, interpolation: &Interpolation, value: Value) -> Result<(), RenderError> {
        let type_name = value.type_name();
        let (text, trusted) = match value {
            Value::Attributes(attributes) if interpolation.guard == Guard::TagAttributes => {
                return self.append_attributes(interpolation, &attributes);
            }
            Value::Safe(text) => (text, true),
            Value::Text(text) => (text, interpolation.raw),
            Value::Attributes(_) => {
                return Err(RenderError::DontInterpolateHere {
                    message: format!("Do not interpolate {type_name} outside of a tag."),
                });
            }
        };
        let rejected = match &interpolation.guard {
            Guard::Text => false,
            // Quoted values are escaped even when marked safe.
            Guard::AttributeValue(_) => {
                self.out.push_str(&escape_html(&text));
                return Ok(());
            }
            Guard::UnquotedAttributeValue | Guard::TagName | Guard::AttributeName => breaks_name(&text),
            Guard::TagAttributes => {
                return Err(RenderError::DontInterpolateHere {
                    message: format!(
                        "Do not interpolate {type_name} in a tag. Instead of {} please try {}<%= html_attributes(attr: value) %>>.",
                        interpolation.around,
                        interpolation.prefix
                    ),
                });
            }
            Guard::Comment => trusted && text.contains("-->"),
            Guard::CData => trusted && text.contains("]]>"),
            Guard::Script => {
                trusted
                    && (text.contains("<!--")
                        || contains_ignore_ascii_case(&text, b"<script")
                        || contains_ignore_ascii_case(&text, b"</script"))
            }
            Guard::RawText(name) => {
                trusted && contains_ignore_ascii_case(&text, format!("</{name}").as_bytes())
            }
        };
        if rejected {
            log::debug!(target: "erb.compile", "rejected value for {} at {:?}", interpolation.guard, interpolation.span);
            return Err(unsafe_html(interpolation));
        }
        if trusted {
            self.out.push_str(&text);
        } else {
            self.out.push_str(&escape_html(&text));
        }
        Ok(())
    }

    fn append_attributes(
        &mut self,
        interpolation: &Interpolation,
        attributes: &[(String, String)],
    ) -> Result<(), RenderError> {
        for (name, value) in attributes {
            if name.is_empty() || breaks_name(name) {
                return Err(unsafe_html(interpolation));
            }
            self.out.push(' ');
            self.out.push_str(name);
            self.out.push_str("=\"");
            self.out.push_str(&escape_html(value));
            self.out.push('"');
        }
        Ok(())
    }
}
