use criterion::{Criterion, black_box, criterion_group, criterion_main};
use erb::{CheckOptions, Compiler, Config, RubyExpr, SafetyTester, TemplateLanguage, tokenize};

const SMALL_BLOCKS: usize = 64;
const LARGE_BLOCKS: usize = 5_000;

fn make_blocks(blocks: usize) -> String {
    let block = concat!(
        "<div class=\"card <%= card.kind %>\" onclick=\"open(<%= card.id.to_json %>)\">\n",
        "  <% if card.title %><h2><%= card.title %></h2><% end %>\n",
        "  <a href=\"<%= card_path(card) %>\">more</a>\n",
        "</div>\n",
        "<script>register(<%= raw card.to_json %>);</script>\n",
    );
    block.repeat(blocks)
}

fn make_script_adversarial(bytes: usize) -> String {
    let mut body = String::with_capacity(bytes + 32);
    body.push_str("<script>");
    while body.len() < bytes {
        body.push_str("</scri<%= x.to_json %>pt");
    }
    body.push_str("</script>");
    body
}

fn bench_tokenize_small(c: &mut Criterion) {
    let input = make_blocks(SMALL_BLOCKS);
    c.bench_function("bench_tokenize_small", |b| {
        b.iter(|| {
            let stream = tokenize(black_box(&input), TemplateLanguage::Html);
            black_box(stream.map(|stream| stream.len()).ok());
        });
    });
}

fn bench_tokenize_large(c: &mut Criterion) {
    let input = make_blocks(LARGE_BLOCKS);
    c.bench_function("bench_tokenize_large", |b| {
        b.iter(|| {
            let stream = tokenize(black_box(&input), TemplateLanguage::Html);
            black_box(stream.map(|stream| stream.len()).ok());
        });
    });
}

fn bench_check_large(c: &mut Criterion) {
    let input = make_blocks(LARGE_BLOCKS);
    let config = Config::default();
    let tester = SafetyTester::new(&config);
    c.bench_function("bench_check_large", |b| {
        b.iter(|| {
            let errors = tester.check(black_box(&input), CheckOptions::default());
            black_box(errors.map(|errors| errors.len()).ok());
        });
    });
}

fn bench_check_script_adversarial(c: &mut Criterion) {
    let input = make_script_adversarial(256 * 1024);
    let config = Config::default();
    let tester = SafetyTester::new(&config);
    c.bench_function("bench_check_script_adversarial", |b| {
        b.iter(|| {
            let errors = tester.check(black_box(&input), CheckOptions::default());
            black_box(errors.map(|errors| errors.len()).ok());
        });
    });
}

fn bench_compile_large(c: &mut Criterion) {
    let input = make_blocks(LARGE_BLOCKS);
    let config = Config::default();
    let compiler = Compiler::new(&config);
    c.bench_function("bench_compile_large", |b| {
        b.iter(|| {
            let program = compiler.compile(black_box(&input));
            black_box(program.map(|program| program.segments.len()).ok());
        });
    });
}

fn bench_ruby_parse(c: &mut Criterion) {
    let code = " form_for(@user, url: users_path(page: params[:page]), html: { class: 'x' }) do |f| ";
    c.bench_function("bench_ruby_parse", |b| {
        b.iter(|| {
            let expr = RubyExpr::parse(black_box(code));
            black_box(expr.map(|expr| expr.calls().len()).ok());
        });
    });
}

criterion_group!(
    benches,
    bench_tokenize_small,
    bench_tokenize_large,
    bench_check_large,
    bench_check_script_adversarial,
    bench_compile_large,
    bench_ruby_parse
);
criterion_main!(benches);
