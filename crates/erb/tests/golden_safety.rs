use std::env;
use std::path::PathBuf;

use erb::snapshot::node_snapshot;
use erb::{CheckOptions, Config, SafetyTester, TemplateLanguage, tokenize};
use erb_test_support::{FixtureCase, diff_lines, load_fixtures};

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

/// `SAFE_ERB_FIXTURE=<substring>` narrows the run to matching case ids.
fn selected_fixtures() -> Vec<FixtureCase> {
    let filter = env::var("SAFE_ERB_FIXTURE").ok();
    load_fixtures(&fixture_root())
        .into_iter()
        .filter(|case| filter.as_deref().is_none_or(|needle| case.id.contains(needle)))
        .collect()
}

fn language(case: &FixtureCase) -> TemplateLanguage {
    case.template_language
        .parse()
        .unwrap_or_else(|err| panic!("fixture '{}' in {:?}: {err}", case.id, case.path))
}

#[test]
fn golden_safety_errors() {
    let config = Config::default();
    let tester = SafetyTester::new(&config);
    let fixtures = selected_fixtures();
    assert!(!fixtures.is_empty(), "no fixtures matched filter");
    for case in &fixtures {
        let options = CheckOptions {
            template_language: language(case),
        };
        let errors = tester
            .check(&case.source, options)
            .unwrap_or_else(|err| panic!("fixture '{}' failed to analyze: {err}", case.id));
        let actual: Vec<String> = errors.into_iter().map(|error| error.message).collect();
        assert!(
            actual == case.errors,
            "safety errors mismatch in fixture '{}' ({:?})\n{}",
            case.id,
            case.path,
            diff_lines(&case.errors, &actual)
        );
    }
}

#[test]
fn golden_node_snapshots() {
    let mut ran = 0usize;
    for case in selected_fixtures() {
        let Some(expected) = &case.nodes else {
            continue;
        };
        ran += 1;
        let stream = tokenize(&case.source, language(&case))
            .unwrap_or_else(|err| panic!("fixture '{}' failed to tokenize: {err}", case.id));
        let actual = node_snapshot(&stream);
        assert!(
            &actual == expected,
            "node snapshot mismatch in fixture '{}' ({:?})\n{}",
            case.id,
            case.path,
            diff_lines(expected, &actual)
        );
    }
    if env::var("SAFE_ERB_FIXTURE").is_err() {
        assert!(ran > 0, "no fixture pins a node snapshot");
    }
}

#[test]
fn golden_checks_are_stable_across_runs() {
    let config = Config::default();
    let tester = SafetyTester::new(&config);
    for case in selected_fixtures() {
        let options = CheckOptions {
            template_language: language(&case),
        };
        let first = tester.check(&case.source, options);
        let second = tester.check(&case.source, options);
        assert_eq!(first, second, "fixture '{}' is not deterministic", case.id);
    }
}
