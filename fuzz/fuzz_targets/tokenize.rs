#![no_main]

use erb::{Node, TemplateLanguage, tokenize};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    for language in [TemplateLanguage::Html, TemplateLanguage::Javascript] {
        let Ok(stream) = tokenize(data, language) else {
            continue;
        };
        let mut last_start = 0;
        for node in &stream {
            let span = node.span();
            assert!(span.start >= last_start, "nodes out of order: {span:?}");
            assert!(span.end <= data.len());
            assert!(data.is_char_boundary(span.start) && data.is_char_boundary(span.end));
            if let Node::Text(content) = node {
                assert!(!content.parts.is_empty(), "empty text node at {span:?}");
            }
            last_start = span.start;
        }
    }
});
