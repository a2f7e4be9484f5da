#![no_main]

use erb::{CheckOptions, Compiler, Config, SafetyTester, TemplateLanguage};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let config = Config::default();
    for template_language in [TemplateLanguage::Html, TemplateLanguage::Javascript] {
        let options = CheckOptions { template_language };
        let first = SafetyTester::new(&config).check(data, options);
        let second = SafetyTester::new(&config).check(data, options);
        assert_eq!(first, second);
    }
    let _ = Compiler::new(&config).compile(data);
});
