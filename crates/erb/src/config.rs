//! Which attributes hold javascript and which methods make a value safe to embed in it.
//!
//! The rule engine only sees these two questions through [`SafetyPolicy`];
//! [`Config`] answers them from data that can be loaded from TOML:
//!
//! ```toml
//! javascript_safe_methods = ["to_json", "j"]
//!
//! [[javascript_attribute_names]]
//! pattern = "^on"
//!
//! [[javascript_attribute_names]]
//! exact = "data-eval"
//! ```
//!
//! An empty or missing key keeps its default.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

pub const DEFAULT_JAVASCRIPT_ATTRIBUTE_PATTERN: &str = "(?i)^on";
pub const DEFAULT_JAVASCRIPT_SAFE_METHOD: &str = "to_json";

static EVENT_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(DEFAULT_JAVASCRIPT_ATTRIBUTE_PATTERN).expect("default attribute pattern is valid")
});

pub trait SafetyPolicy {
    /// Whether values of this (lowercased) attribute are executed as javascript.
    fn is_javascript_attribute(&self, name: &str) -> bool;

    /// Whether this method serializes its receiver into a javascript literal.
    /// Matching is exact and case-sensitive.
    fn is_javascript_safe_method(&self, name: &str) -> bool;
}

impl<T: SafetyPolicy + ?Sized> SafetyPolicy for &T {
    fn is_javascript_attribute(&self, name: &str) -> bool {
        (**self).is_javascript_attribute(name)
    }

    fn is_javascript_safe_method(&self, name: &str) -> bool {
        (**self).is_javascript_safe_method(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid javascript attribute pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Clone, Debug)]
pub enum AttributeNameMatcher {
    /// ASCII case-insensitive equality.
    Exact(String),
    Pattern(Regex),
}

impl AttributeNameMatcher {
    pub fn pattern(pattern: &str) -> Result<Self, ConfigError> {
        Regex::new(pattern)
            .map(AttributeNameMatcher::Pattern)
            .map_err(|source| ConfigError::Pattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            AttributeNameMatcher::Exact(exact) => exact.eq_ignore_ascii_case(name),
            AttributeNameMatcher::Pattern(regex) => regex.is_match(name),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub javascript_attribute_names: Vec<AttributeNameMatcher>,
    pub javascript_safe_methods: BTreeSet<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            javascript_attribute_names: vec![AttributeNameMatcher::Pattern(EVENT_HANDLER.clone())],
            javascript_safe_methods: BTreeSet::from([DEFAULT_JAVASCRIPT_SAFE_METHOD.to_string()]),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    javascript_attribute_names: Vec<RawMatcher>,
    #[serde(default)]
    javascript_safe_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawMatcher {
    Pattern(String),
    Exact(String),
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        let mut config = Config::default();
        if !raw.javascript_attribute_names.is_empty() {
            config.javascript_attribute_names = raw
                .javascript_attribute_names
                .iter()
                .map(|matcher| match matcher {
                    RawMatcher::Pattern(pattern) => AttributeNameMatcher::pattern(pattern),
                    RawMatcher::Exact(name) => Ok(AttributeNameMatcher::Exact(name.clone())),
                })
                .collect::<Result<_, _>>()?;
        }
        if !raw.javascript_safe_methods.is_empty() {
            config.javascript_safe_methods = raw.javascript_safe_methods.into_iter().collect();
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        log::debug!(
            target: "erb.config",
            "loaded {path:?}: {} javascript attribute matchers, {} safe methods",
            config.javascript_attribute_names.len(),
            config.javascript_safe_methods.len()
        );
        Ok(config)
    }

    pub fn with_javascript_attribute(mut self, matcher: AttributeNameMatcher) -> Self {
        self.javascript_attribute_names.push(matcher);
        self
    }

    pub fn with_javascript_safe_method(mut self, name: impl Into<String>) -> Self {
        self.javascript_safe_methods.insert(name.into());
        self
    }
}

impl SafetyPolicy for Config {
    fn is_javascript_attribute(&self, name: &str) -> bool {
        self.javascript_attribute_names
            .iter()
            .any(|matcher| matcher.matches(name))
    }

    fn is_javascript_safe_method(&self, name: &str) -> bool {
        self.javascript_safe_methods.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_event_handlers_and_to_json() {
        let config = Config::default();
        assert!(config.is_javascript_attribute("onclick"));
        assert!(config.is_javascript_attribute("ONLOAD"));
        assert!(!config.is_javascript_attribute("data-onclick"));
        assert!(!config.is_javascript_attribute("href"));
        assert!(config.is_javascript_safe_method("to_json"));
        assert!(!config.is_javascript_safe_method("To_json"));
        assert!(!config.is_javascript_safe_method("html_safe"));
    }

    #[test]
    fn toml_replaces_only_the_keys_it_sets() {
        let config = Config::from_toml_str(
            r#"
javascript_safe_methods = ["to_json", "j"]

[[javascript_attribute_names]]
exact = "data-eval"

[[javascript_attribute_names]]
pattern = "^ng-"
"#,
        )
        .unwrap();
        assert!(config.is_javascript_safe_method("j"));
        assert!(config.is_javascript_attribute("data-eval"));
        assert!(config.is_javascript_attribute("ng-click"));
        assert!(!config.is_javascript_attribute("onclick"));

        let config = Config::from_toml_str("javascript_safe_methods = []").unwrap();
        assert!(config.is_javascript_safe_method("to_json"));
        assert!(config.is_javascript_attribute("onclick"));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = Config::from_toml_str(
            r#"
[[javascript_attribute_names]]
pattern = "("
"#,
        )
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::Pattern { ref pattern, .. } if pattern == "("),
            "got: {err:?}"
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_toml_str("javascript_safe_method = [\"j\"]").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)), "got: {err:?}");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Config::load(Path::new("/nonexistent/safe-erb.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }), "got: {err:?}");
    }

    #[test]
    fn builder_extends_defaults() {
        let config = Config::default()
            .with_javascript_attribute(AttributeNameMatcher::Exact("x-init".to_string()))
            .with_javascript_safe_method("to_js");
        assert!(config.is_javascript_attribute("x-init"));
        assert!(config.is_javascript_attribute("onclick"));
        assert!(config.is_javascript_safe_method("to_js"));
    }
}
