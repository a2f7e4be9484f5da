//! Golden fixture loading for template safety tests.
//!
//! Fixture files are TOML documents with a versioned `format` key and a list
//! of `[[case]]` tables:
//!
//! ```toml
//! format = "safe-erb-fixture-v1"
//!
//! [[case]]
//! id = "onclick-plain-output"
//! source = '<div onclick="<%= value %>">'
//! errors = ["erb interpolation in javascript attribute must call '(...).to_json'"]
//! ```
//!
//! `template_language` (`html` or `javascript`) may be set per file and
//! overridden per case. `nodes` optionally pins the node snapshot.

use std::collections::BTreeSet;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const FIXTURE_FORMAT_V1: &str = "safe-erb-fixture-v1";

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FixtureFile {
    format: String,
    template_language: Option<String>,
    #[serde(rename = "case", default)]
    cases: Vec<RawCase>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCase {
    id: String,
    source: String,
    template_language: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
    nodes: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixtureCase {
    pub id: String,
    pub path: PathBuf,
    pub source: String,
    /// `html` unless the case or its file says otherwise.
    pub template_language: String,
    pub errors: Vec<String>,
    pub nodes: Option<Vec<String>>,
}

/// Load every `*.toml` fixture in `dir`, sorted by file name then case order.
/// Panics on malformed fixtures and duplicate case ids.
pub fn load_fixtures(dir: &Path) -> Vec<FixtureCase> {
    let entries = fs::read_dir(dir)
        .unwrap_or_else(|err| panic!("failed to read fixture dir {dir:?}: {err}"));
    let mut paths: Vec<PathBuf> = entries
        .map(|entry| {
            entry
                .unwrap_or_else(|err| panic!("failed to read fixture dir entry in {dir:?}: {err}"))
                .path()
        })
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();
    assert!(!paths.is_empty(), "no fixtures found in {dir:?}");

    let mut seen = BTreeSet::new();
    let mut cases = Vec::new();
    for path in paths {
        for case in load_fixture_file(&path) {
            assert!(
                seen.insert(case.id.clone()),
                "duplicate fixture id '{}' in {path:?}",
                case.id
            );
            cases.push(case);
        }
    }
    cases
}

pub fn load_fixture_file(path: &Path) -> Vec<FixtureCase> {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read fixture {path:?}: {err}"));
    let file: FixtureFile = toml::from_str(&content)
        .unwrap_or_else(|err| panic!("failed to parse fixture {path:?}: {err}"));
    assert_eq!(
        file.format, FIXTURE_FORMAT_V1,
        "unsupported fixture format in {path:?}"
    );
    assert!(!file.cases.is_empty(), "fixture {path:?} has no cases");
    let default_language = file.template_language.unwrap_or_else(|| "html".to_string());
    file.cases
        .into_iter()
        .map(|case| {
            assert!(!case.id.is_empty(), "fixture case without id in {path:?}");
            FixtureCase {
                id: case.id,
                path: path.to_path_buf(),
                source: case.source,
                template_language: case
                    .template_language
                    .unwrap_or_else(|| default_language.clone()),
                errors: case.errors,
                nodes: case.nodes,
            }
        })
        .collect()
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if ch < ' ' => {
                let _ = write!(&mut out, "\\u{{{:02X}}}", ch as u32);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Context around the first differing line, for assertion messages.
pub fn diff_lines(expected: &[String], actual: &[String]) -> String {
    let max = expected.len().max(actual.len());
    let missing = "<missing>".to_string();
    let line = |lines: &[String], i: usize| escape_text(lines.get(i).unwrap_or(&missing));
    let mut out = String::new();
    let mismatch = (0..max).find(|&i| expected.get(i) != actual.get(i));
    if let Some(i) = mismatch {
        let start = i.saturating_sub(2);
        let end = (i + 3).min(max);
        let _ = writeln!(
            &mut out,
            "first mismatch at line {} (showing {}..={}):",
            i + 1,
            start + 1,
            end
        );
        for index in start..end {
            let marker = if index == i { ">" } else { " " };
            let _ = writeln!(&mut out, "{marker} {:>4}  expected: {}", index + 1, line(expected, index));
            let _ = writeln!(&mut out, "{marker} {:>4}    actual: {}", index + 1, line(actual, index));
        }
    }
    let _ = writeln!(
        &mut out,
        "expected {} lines, actual {} lines",
        expected.len(),
        actual.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_points_at_first_mismatch() {
        let expected = vec!["a".to_string(), "b\n".to_string()];
        let actual = vec!["a".to_string(), "c".to_string(), "d".to_string()];
        let diff = diff_lines(&expected, &actual);
        assert!(diff.starts_with("first mismatch at line 2"), "got: {diff}");
        assert!(diff.contains("expected: b\\n"), "got: {diff}");
        assert!(!diff.contains("actual: <missing>"), "got: {diff}");
        assert!(diff.contains("expected: <missing>"), "got: {diff}");
        assert!(diff.ends_with("expected 2 lines, actual 3 lines\n"));
    }

    #[test]
    fn escapes_control_characters() {
        assert_eq!(escape_text("a\t\"b\"\u{1}"), "a\\t\\\"b\\\"\\u{01}");
    }
}
