use super::tokenize;
use crate::context::Context;
use crate::erb::TokenizeError;
use crate::snapshot::node_snapshot;
use crate::span::Span;
use crate::token::{ExpressionKind, Node, NodeStream, TemplateLanguage};

fn html(source: &str) -> NodeStream {
    tokenize(source, TemplateLanguage::Html).expect("tokenize must succeed")
}

fn snapshot(source: &str) -> Vec<String> {
    node_snapshot(&html(source))
}

fn contexts(stream: &NodeStream) -> Vec<(String, Context)> {
    let mut out = Vec::new();
    for node in stream {
        match node {
            Node::Element(element) => {
                for token in element.expressions() {
                    out.push((token.code.trim().to_string(), token.context.clone()));
                }
            }
            _ => {
                if let Some(content) = node.content() {
                    for token in content.expressions() {
                        out.push((token.code.trim().to_string(), token.context.clone()));
                    }
                }
            }
        }
    }
    out
}

#[test]
fn plain_markup_round_trips_into_nodes() {
    assert_eq!(
        snapshot("<div class=\"box\">hello <b>world</b></div>"),
        vec![
            "StartTag(div class=\"box\")",
            "Text(hello )",
            "StartTag(b)",
            "Text(world)",
            "EndTag(b)",
            "EndTag(div)",
        ]
    );
}

#[test]
fn classifies_markers_in_every_tag_position() {
    let stream = html(
        "<tag-<%= a %> data-<%= b %>-foo x=<%= c %> y='<%= d %>' z=\"<%= e %>\" <%= f %>>",
    );
    assert_eq!(
        contexts(&stream),
        vec![
            ("a".to_string(), Context::TagName),
            ("b".to_string(), Context::AttributeName),
            ("c".to_string(), Context::AttributeValueUnquoted),
            ("d".to_string(), Context::AttributeValueQuoted('\'')),
            ("e".to_string(), Context::AttributeValueQuoted('"')),
            ("f".to_string(), Context::TagBody),
        ]
    );
    assert_eq!(
        node_snapshot(&stream),
        vec![
            "StartTag(tag-<%= a %> data-<%= b %>-foo x=<%= c %> y='<%= d %>' z=\"<%= e %>\" <%= f %>)"
        ]
    );
}

#[test]
fn element_exposes_attribute_lookup_and_names() {
    let stream = html("<SCRIPT Type=\"text/javascript\" type=\"ignored\"></script>");
    let element = stream.get(0).and_then(Node::as_element).unwrap();
    assert_eq!(element.name, "script");
    assert!(!element.closing);
    let attr = element.attribute("type").unwrap();
    assert_eq!(attr.unescaped_value(), "text/javascript");
    assert_eq!(attr.quote, Some('"'));
    let source = "<SCRIPT Type=\"text/javascript\" type=\"ignored\"></script>";
    assert_eq!(attr.value(source), Some("\"text/javascript\""));
    let closing = stream.get(1).and_then(Node::as_element).unwrap();
    assert!(closing.closing);
}

#[test]
fn unquoted_value_records_marker_position() {
    let stream = html("<a href=something<%= value %>>");
    let element = stream.get(0).and_then(Node::as_element).unwrap();
    let attr = &element.attributes[0];
    assert_eq!(attr.quote, None);
    assert_eq!(attr.value_parts.len(), 2);
    assert_eq!(attr.value_parts[0].text(), Some("something"));
    assert_eq!(
        attr.value_parts[1].expression().map(|t| t.context.clone()),
        Some(Context::AttributeValueUnquoted)
    );
}

#[test]
fn comment_and_cdata_bodies_carry_markers() {
    let stream = html("<!-- <%= value %> --><![CDATA[<% if x %>]]>");
    assert_eq!(
        node_snapshot(&stream),
        vec!["Comment( <%= value %> )", "CData(<% if x %>)"]
    );
    assert_eq!(
        contexts(&stream),
        vec![
            ("value".to_string(), Context::Comment),
            ("if x".to_string(), Context::CData),
        ]
    );
    assert_eq!(stream.get(0).unwrap().span(), Span::new(0, 21));
}

#[test]
fn script_body_is_not_reparsed_as_markup() {
    let stream = html("<script>var x = \"<b>\" + <%= value %>;</ScRiPt >after");
    assert_eq!(
        node_snapshot(&stream),
        vec![
            "StartTag(script)",
            "Text(var x = \"<b>\" + <%= value %>;)",
            "EndTag(ScRiPt)",
            "Text(after)",
        ]
    );
    assert_eq!(
        contexts(&stream),
        vec![("value".to_string(), Context::ScriptBody)]
    );
}

#[test]
fn rawtext_bodies_are_classified_by_element() {
    let stream = html("<title><%= a %></title><textarea><b><%= b %></textarea>");
    assert_eq!(
        contexts(&stream),
        vec![
            ("a".to_string(), Context::RawTextBody("title".to_string())),
            ("b".to_string(), Context::RawTextBody("textarea".to_string())),
        ]
    );
    assert_eq!(
        node_snapshot(&stream)[4],
        "Text(<b><%= b %>)",
        "textarea body must stay literal"
    );
}

#[test]
fn rawtext_close_tag_does_not_accept_near_matches() {
    assert_eq!(
        snapshot("<script>ok</scriptx >no</script>"),
        vec!["StartTag(script)", "Text(ok</scriptx >no)", "EndTag(script)"]
    );
}

#[test]
fn missing_rawtext_close_tag_keeps_remainder_as_body() {
    assert_eq!(
        snapshot("<style>a { } <%= x %>"),
        vec!["StartTag(style)", "Text(a { } <%= x %>)"]
    );
}

#[test]
fn interpolated_tag_name_after_lone_angle_bracket() {
    let stream = html("<<%= name %> id=1></<%= name %>>");
    assert_eq!(
        node_snapshot(&stream),
        vec!["StartTag(<%= name %> id=1)", "EndTag(<%= name %>)"]
    );
    assert_eq!(
        contexts(&stream),
        vec![
            ("name".to_string(), Context::TagName),
            ("name".to_string(), Context::TagName),
        ]
    );
}

#[test]
fn stray_angle_brackets_stay_text() {
    assert_eq!(snapshot("1 < 2 <= 3"), vec!["Text(1 < 2 <= 3)"]);
    assert_eq!(
        snapshot("<!DOCTYPE html><p>x</p>"),
        vec!["Text(<!DOCTYPE html>)", "StartTag(p)", "Text(x)", "EndTag(p)"]
    );
}

#[test]
fn angle_bracket_before_template_comment_is_text() {
    assert_eq!(snapshot("a <<%# note %> b"), vec!["Text(a < b)"]);
}

#[test]
fn self_closing_and_boolean_attributes() {
    assert_eq!(
        snapshot("<input disabled value=x/><br/>"),
        vec!["StartTag(input disabled value=x/)", "StartTag(br /)"]
    );
}

#[test]
fn text_markers_are_classified_as_text() {
    let stream = html("<p>Hello <%= name %><% if admin %>!<% end %></p>");
    assert_eq!(
        contexts(&stream),
        vec![
            ("name".to_string(), Context::Text),
            ("if admin".to_string(), Context::Text),
            ("end".to_string(), Context::Text),
        ]
    );
    let content = stream.get(1).and_then(Node::content).unwrap();
    let kinds: Vec<ExpressionKind> = content.expressions().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ExpressionKind::PlainOutput,
            ExpressionKind::Statement,
            ExpressionKind::Statement
        ]
    );
}

#[test]
fn javascript_mode_is_a_single_script_body() {
    let stream = tokenize("var a = <%= a %>;\n<div><%= b %></div>", TemplateLanguage::Javascript)
        .unwrap();
    assert_eq!(stream.len(), 1);
    assert_eq!(stream.template_language(), TemplateLanguage::Javascript);
    assert_eq!(
        contexts(&stream),
        vec![
            ("a".to_string(), Context::ScriptBody),
            ("b".to_string(), Context::ScriptBody),
        ]
    );
}

#[test]
fn unterminated_marker_aborts_tokenization() {
    let err = tokenize("<a href=\"<%= x \">", TemplateLanguage::Html).unwrap_err();
    assert!(matches!(err, TokenizeError::UnterminatedMarker { .. }));
}

#[test]
fn unterminated_tag_is_emitted_at_end_of_input() {
    let stream = html("<a href=\"<%= x %>");
    assert_eq!(node_snapshot(&stream), vec!["StartTag(a href=\"<%= x %>\")"]);
    assert_eq!(
        stream.get(0).unwrap().span(),
        Span::new(0, "<a href=\"<%= x %>".len())
    );
}

#[test]
fn tokenizing_twice_is_deterministic() {
    let source = "<div onclick=\"<%= a %>\"><script><%= b %></script><!-- <% c %> --></div>";
    assert_eq!(html(source), html(source));
}

#[test]
fn handles_utf8_around_markers() {
    assert_eq!(
        snapshot("<p title=\"café <%= x %> naïve\">😊<%= y %>é</p>"),
        vec![
            "StartTag(p title=\"café <%= x %> naïve\")",
            "Text(😊<%= y %>é)",
            "EndTag(p)"
        ]
    );
}

#[test]
fn tons_of_angle_brackets_terminate() {
    let input = "<".repeat(50_000);
    let stream = html(&input);
    assert!(stream.len() <= input.len());
}
