//! Human-readable safety reports.

use std::fmt;

use tools::LineIndex;

use crate::config::SafetyPolicy;
use crate::safety::{AnalysisError, CheckOptions, SafetyError, SafetyTester};

pub const SAFETY_TIPS: &str = r#"-----------

The javascript snippets listed above do not appear to be escaped properly
in a javascript context. Here are some tips:

Never use html_safe inside a html tag, since it is _never_ safe:
  <a href="<%= value.html_safe %>">
                    ^^^^^^^^^^

Always use .to_json for html attributes which contain javascript, like 'onclick',
or twine attributes like 'data-define', 'data-context', 'data-eval', 'data-bind', etc:
  <div onclick="<%= value.to_json %>">
                         ^^^^^^^^

Always use raw and to_json together within <script> tags:
  <script type="text/javascript">
    var yourValue = <%= raw value.to_json %>;
  </script>             ^^^      ^^^^^^^^

-----------
"#;

/// Point at the offending span: `On line N`, the message, the source line and
/// a caret line. Carets are clamped to the first line of the span.
pub fn format_safety_error(source: &str, error: &SafetyError) -> String {
    let index = LineIndex::new(source);
    let position = index.line_col(error.span.start);
    let (line_start, line_end) = index
        .line_range(source, position.line)
        .unwrap_or((0, source.len()));
    let line = &source[line_start..line_end];
    let caret_start = error.span.start.clamp(line_start, line_end);
    let caret_end = error.span.end.clamp(caret_start, line_end);
    let indent = source[line_start..caret_start].chars().count();
    let width = source[caret_start..caret_end].chars().count().max(1);
    format!(
        "On line {}\n{}\n{}\n{}{}\n",
        position.line,
        error.message,
        line,
        " ".repeat(indent),
        "^".repeat(width)
    )
}

/// Failure of [`assert_erb_safety`].
#[derive(Debug)]
pub enum SafetyReport {
    Violations {
        source: String,
        errors: Vec<SafetyError>,
    },
    Analysis(AnalysisError),
}

impl fmt::Display for SafetyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyReport::Violations { source, errors } => {
                for error in errors {
                    f.write_str(&format_safety_error(source, error))?;
                }
                f.write_str(SAFETY_TIPS)
            }
            SafetyReport::Analysis(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for SafetyReport {}

impl From<AnalysisError> for SafetyReport {
    fn from(err: AnalysisError) -> Self {
        SafetyReport::Analysis(err)
    }
}

/// `Ok(())` when `source` has no violations under `policy`.
pub fn assert_erb_safety<P: SafetyPolicy + ?Sized>(
    source: &str,
    policy: &P,
    options: CheckOptions,
) -> Result<(), SafetyReport> {
    let errors = SafetyTester::new(policy).check(source, options)?;
    if errors.is_empty() {
        return Ok(());
    }
    Err(SafetyReport::Violations {
        source: source.to_string(),
        errors,
    })
}
