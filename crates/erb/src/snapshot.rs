//! Stable one-line-per-node rendering of a node stream.
//!
//! Used by golden fixtures and the `safe-erb tokens` command. Markers render as
//! their opening delimiter, the code, and `%>`; literal text renders verbatim.

use crate::token::{Element, ExpressionToken, Node, NodeStream, Part};

fn marker(token: &ExpressionToken) -> String {
    format!("{}{}%>", token.kind.opening(), token.code)
}

fn parts(parts: &[Part]) -> String {
    parts
        .iter()
        .map(|part| match part {
            Part::Text { text, .. } => text.clone(),
            Part::Expression(token) => marker(token),
        })
        .collect()
}

fn element(element: &Element) -> String {
    let mut items: Vec<(usize, String)> = Vec::new();
    for attribute in &element.attributes {
        let mut item = parts(&attribute.name_parts);
        if attribute.has_equals {
            item.push('=');
            let value = parts(&attribute.value_parts);
            match attribute.quote {
                Some(quote) => {
                    item.push(quote);
                    item.push_str(&value);
                    item.push(quote);
                }
                None => item.push_str(&value),
            }
        }
        items.push((attribute.span.start, item));
    }
    for token in &element.interpolations {
        items.push((token.span.start, marker(token)));
    }
    items.sort_by_key(|(start, _)| *start);

    let mut line = String::from(if element.closing { "EndTag(" } else { "StartTag(" });
    line.push_str(&parts(&element.name_parts));
    for (_, item) in items {
        line.push(' ');
        line.push_str(&item);
    }
    if element.self_closing {
        line.push_str(" /");
    }
    line.push(')');
    line
}

pub fn node_snapshot(stream: &NodeStream) -> Vec<String> {
    stream
        .iter()
        .map(|node| match node {
            Node::Element(el) => element(el),
            Node::Text(content) => format!("Text({})", parts(&content.parts)),
            Node::Comment(content) => format!("Comment({})", parts(&content.parts)),
            Node::CData(content) => format!("CData({})", parts(&content.parts)),
        })
        .collect()
}
