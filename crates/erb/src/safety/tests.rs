use super::*;
use crate::config::{AttributeNameMatcher, Config};

fn check_with(config: &Config, source: &str, template_language: TemplateLanguage) -> Vec<SafetyError> {
    SafetyTester::new(config)
        .check(source, CheckOptions { template_language })
        .unwrap_or_else(|err| panic!("analysis of {source:?} failed: {err}"))
}

fn messages(source: &str) -> Vec<String> {
    check_with(&Config::default(), source, TemplateLanguage::Html)
        .into_iter()
        .map(|error| error.message)
        .collect()
}

fn javascript_messages(source: &str) -> Vec<String> {
    check_with(&Config::default(), source, TemplateLanguage::Javascript)
        .into_iter()
        .map(|error| error.message)
        .collect()
}

fn none() -> Vec<String> {
    Vec::new()
}

#[test]
fn plain_interpolation_in_ordinary_attribute_is_safe() {
    assert_eq!(messages("<a href=\"<%= value %>\">"), none());
    assert_eq!(messages("<a href=\"/users/<%= user.id %>/edit\">"), none());
    assert_eq!(messages("<a href='<%= value.to_s %>'>"), none());
}

#[test]
fn raw_output_marker_in_attribute_is_never_safe() {
    assert_eq!(messages("<a href=\"<%== value %>\">"), vec![RAW_OUTPUT_IN_ATTRIBUTE]);
    assert_eq!(messages("<a onclick=\"<%== value.to_json %>\">"), vec![RAW_OUTPUT_IN_ATTRIBUTE]);
}

#[test]
fn raw_and_html_safe_calls_in_attribute_are_never_safe() {
    assert_eq!(messages("<a href=\"<%= raw value %>\">"), vec![RAW_CALL_IN_ATTRIBUTE]);
    assert_eq!(messages("<a href=\"<%= raw(value) %>\">"), vec![RAW_CALL_IN_ATTRIBUTE]);
    assert_eq!(
        messages("<a href=\"<%= value.html_safe %>\">"),
        vec![HTML_SAFE_IN_ATTRIBUTE]
    );
    assert_eq!(
        messages("<a onclick=\"<%= value.to_json.html_safe %>\">"),
        vec![HTML_SAFE_IN_ATTRIBUTE],
        "html_safe wins over the javascript attribute rule"
    );
}

#[test]
fn javascript_attribute_requires_safe_outermost_call() {
    assert_eq!(
        messages("<div onclick=\"<%= value %>\">"),
        vec![UNSAFE_JAVASCRIPT_ATTRIBUTE]
    );
    assert_eq!(messages("<div onclick=\"<%= value.to_json %>\">"), none());
    assert_eq!(messages("<div onclick=\"foo(<%= value.to_json %>)\">"), none());
    assert_eq!(
        messages("<div onclick=\"<%= value.to_json.strip %>\">"),
        vec![UNSAFE_JAVASCRIPT_ATTRIBUTE]
    );
    assert_eq!(
        messages("<div OnMouseOver=\"<%= 'literal' %>\">"),
        vec![UNSAFE_JAVASCRIPT_ATTRIBUTE]
    );
}

#[test]
fn statement_markers_in_attributes_are_ignored() {
    assert_eq!(messages("<div class=\"<% if x %>a<% end %>\">"), none());
}

#[test]
fn configured_attribute_names_and_methods() {
    let config = Config::default()
        .with_javascript_attribute(AttributeNameMatcher::Exact("data-eval".to_string()))
        .with_javascript_safe_method("j");
    let errors = check_with(
        &config,
        "<div data-eval=\"<%= value %>\" data-other=\"<%= value %>\" onclick=\"<%= j value %>\">",
        TemplateLanguage::Html,
    );
    assert_eq!(errors.len(), 1, "got: {errors:?}");
    assert_eq!(errors[0].message, UNSAFE_JAVASCRIPT_ATTRIBUTE);
}

#[test]
fn script_content_must_resolve_to_to_json() {
    assert_eq!(
        messages("<script>var x = <%= value.html_safe %>;</script>"),
        vec![UNSAFE_JAVASCRIPT_TAG]
    );
    assert_eq!(
        messages("<script>var x = <%= value %>;</script>"),
        vec![UNSAFE_JAVASCRIPT_TAG]
    );
    assert_eq!(messages("<script>var x = <%= raw value.to_json %>;</script>"), none());
    assert_eq!(messages("<script>var x = <%= raw(value.to_json) %>;</script>"), none());
    assert_eq!(messages("<script>var x = <%= value.to_json.html_safe %>;</script>"), none());
    assert_eq!(messages("<script>var x = <%== value.to_json %>;</script>"), none());
    assert_eq!(
        messages("<script>var x = <%= raw value %>;</script>"),
        vec![UNSAFE_JAVASCRIPT_TAG]
    );
    assert_eq!(
        messages("<script>var x = <%= raw() %>;</script>"),
        vec![UNSAFE_JAVASCRIPT_TAG]
    );
}

#[test]
fn one_violation_per_script_marker() {
    assert_eq!(
        messages("<script><%= raw(a, b) %> <%= c.to_json %> <%= d %></script>"),
        vec![UNSAFE_JAVASCRIPT_TAG, UNSAFE_JAVASCRIPT_TAG]
    );
}

#[test]
fn script_type_whitelist() {
    assert_eq!(
        messages("<script type=\"text/plain\"></script>"),
        vec![
            "\"text/plain\" is not a valid type, valid types are text/javascript, text/template, text/html"
        ]
    );
    assert_eq!(messages("<script type=\"text/template\"></script>"), none());
    assert_eq!(messages("<script type='text/&#106;avascript'></script>"), none());
}

#[test]
fn script_type_error_points_at_first_value_part() {
    let source = "<script type=\"bogus\"></script>";
    let errors = check_with(&Config::default(), source, TemplateLanguage::Html);
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0].offender, Offender::Attribute(attr) if attr.name == "type"));
    assert_eq!(errors[0].span.slice(source), "bogus");
}

#[test]
fn html_script_type_exempts_statements_and_json_rule() {
    assert_eq!(
        messages("<script type=\"text/html\"><% if x %><%= foo %><% end %></script>"),
        none()
    );
}

#[test]
fn template_script_type_bans_statements_only() {
    assert_eq!(
        messages("<script type=\"text/template\"><% if x %><%= foo %><% end %></script>"),
        vec![STATEMENT_NOT_ALLOWED]
    );
}

#[test]
fn statements_in_javascript_body_except_end() {
    assert_eq!(
        messages("<script><% if foo %>a();<% end %></script>"),
        vec![STATEMENT_NOT_ALLOWED]
    );
    assert_eq!(messages("<script><%- end -%></script>"), none());
}

#[test]
fn comments_and_cdata_only_ban_statements() {
    assert_eq!(messages("<!-- <%= value %> -->"), none());
    assert_eq!(messages("<!-- <% value %> -->"), vec![STATEMENT_NOT_ALLOWED]);
    assert_eq!(messages("<![CDATA[<% value %>]]>"), vec![STATEMENT_NOT_ALLOWED]);
}

#[test]
fn statements_in_html_text_are_fine() {
    assert_eq!(messages("<% if foo %><p><%= bar %></p><% end %>"), none());
}

#[test]
fn javascript_template_language() {
    assert_eq!(javascript_messages("var x = <%= value %>;"), vec![UNSAFE_JAVASCRIPT_TAG]);
    assert_eq!(javascript_messages("var x = <%= value.to_json %>;"), none());
    assert_eq!(
        javascript_messages("<% if x %>var y;<% end %>"),
        vec![STATEMENT_NOT_ALLOWED]
    );
}

#[test]
fn deprecated_javascript_tag_helper() {
    assert_eq!(
        messages("<%= javascript_tag do %>alert(1);<% end %>"),
        vec![DEPRECATED_JAVASCRIPT_TAG]
    );
    assert_eq!(
        messages("<% javascript_tag do %>alert(1);<% end %>"),
        vec![DEPRECATED_JAVASCRIPT_TAG]
    );
    assert_eq!(messages("<%= foo.javascript_tag %>"), vec![DEPRECATED_JAVASCRIPT_TAG]);
    assert_eq!(messages("<%= javascript_tag.foo %>"), none());
}

#[test]
fn unparseable_code_is_skipped_by_deprecated_check_only() {
    assert_eq!(messages("<% if foo %><p></p><% end %><% else %>"), none());

    let config = Config::default();
    let tester = SafetyTester::new(&config);
    let err = tester
        .check("<a href=\"<%= foo( %>\">", CheckOptions::default())
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Parse { .. }), "got: {err:?}");
    assert_eq!(err.span(), Span::new(9, 20));

    let err = tester
        .check("<script><%= foo( %></script>", CheckOptions::default())
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Parse { .. }), "got: {err:?}");
}

#[test]
fn character_literal_in_attribute_parses() {
    assert_eq!(messages("<a href=\"<%= ?a %>\">"), none());
    assert_eq!(
        messages("<div onclick=\"<%= ?a %>\">"),
        vec!["erb interpolation in javascript attribute must call '(...).to_json'".to_string()]
    );
}

#[test]
fn overlong_method_chain_in_attribute_is_a_parse_error() {
    let config = Config::default();
    let source = format!("<a href=\"<%= x{} %>\">", ".a".repeat(100_000));
    let err = SafetyTester::new(&config)
        .check(&source, CheckOptions::default())
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Parse { .. }), "got: {err:?}");
}

#[test]
fn unterminated_marker_aborts_analysis() {
    let config = Config::default();
    let err = SafetyTester::new(&config)
        .check("<p><%= value </p>", CheckOptions::default())
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Tokenize(_)), "got: {err:?}");
}

#[test]
fn violations_point_at_the_marker_in_document_order() {
    let source = "<a onclick=\"<%= a %>\" href=\"<%== b %>\"><script><%= c %></script>";
    let errors = check_with(&Config::default(), source, TemplateLanguage::Html);
    let offenders: Vec<&str> = errors.iter().map(|error| error.span.slice(source)).collect();
    assert_eq!(offenders, vec!["<%= a %>", "<%== b %>", "<%= c %>"]);
    assert!(errors
        .iter()
        .all(|error| matches!(error.offender, Offender::Expression(_))));
}

#[test]
fn checking_is_idempotent() {
    let source = "<div onclick=\"<%= a %>\"><script><%= b.html_safe %><% c %></script></div>";
    let config = Config::default();
    let tester = SafetyTester::new(&config);
    let first = tester.check(source, CheckOptions::default()).unwrap();
    let second = tester.check(source, CheckOptions::default()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}
