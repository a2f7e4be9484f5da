#![no_main]

use erb::RubyExpr;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(expr) = RubyExpr::parse(data) {
        for call in expr.calls() {
            assert!(!call.method.is_empty());
        }
    }
});
