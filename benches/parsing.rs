//! Benchmarks for chatvault parsing and classification.
//!
//! Run with: `cargo bench`
//! Run specific group: `cargo bench --bench parsing -- export_parsing`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chatvault::classifier;
use chatvault::files::sanitize_filename;
use chatvault::parser::ExportParser;

// =============================================================================
// Test Data Generators
// =============================================================================

fn generate_export_html(count: usize) -> String {
    let mut body = String::with_capacity(count * 160);
    body.push_str("<html><head><title>Alice's WhatsApp</title></head><body><h3>Alice</h3>\n");
    for i in 0..count {
        let class = if i % 2 == 0 {
            "triangle-isosceles"
        } else {
            "triangle-isosceles2"
        };
        let day = 1 + i % 28;
        let hour = i % 24;
        let minute = i % 60;
        body.push_str(&format!(
            "<p class=\"date\"><font color=\"#b4b4b4\">2025/04/{day:02} {hour:02}:{minute:02}</font></p>\n"
        ));
        if i % 10 == 9 {
            body.push_str(&format!(
                "<table class=\"{class}\"><tr><td><a href=\"media/voice_{i}.opus\">audio</a></td><td width=\"150\">vocal {i}</td></tr></table>\n"
            ));
        } else {
            body.push_str(&format!(
                "<p class=\"{class}\"><font>Message number {i}</font></p>\n"
            ));
        }
    }
    body.push_str("</body></html>");
    body
}

// =============================================================================
// Parsing Benchmarks
// =============================================================================

fn bench_export_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("export_parsing");
    let parser = ExportParser::new();

    for size in [100_usize, 1_000, 10_000] {
        let html = generate_export_html(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &html, |b, html| {
            b.iter(|| {
                let conversation = parser.parse_str(black_box(html), None).unwrap();
                black_box(conversation)
            });
        });
    }
    group.finish();
}

// =============================================================================
// Classification Benchmarks
// =============================================================================

fn bench_classification(c: &mut Criterion) {
    let markup = r#"<p class="triangle-isosceles" style="left:170px"><font>hello</font></p>"#;

    c.bench_function("classify_css_hit", |b| {
        b.iter(|| black_box(classifier::classify(black_box(Some("triangle-isosceles2")), None, None)));
    });
    c.bench_function("classify_position_fallback", |b| {
        b.iter(|| black_box(classifier::classify(None, black_box(Some(markup)), None)));
    });
}

// =============================================================================
// Filename Sanitization Benchmarks
// =============================================================================

fn bench_sanitize(c: &mut Criterion) {
    let decorated = "\u{2665}\u{2666} Jean Dupont (Cousin) \u{2660}".repeat(4);

    c.bench_function("sanitize_clean_name", |b| {
        b.iter(|| black_box(sanitize_filename(black_box("Alice Dupont"))));
    });
    c.bench_function("sanitize_decorated_name", |b| {
        b.iter(|| black_box(sanitize_filename(black_box(&decorated))));
    });
}

// =============================================================================
// Criterion Configuration
// =============================================================================

criterion_group!(
    benches,
    bench_export_parsing,
    bench_classification,
    bench_sanitize,
);

criterion_main!(benches);
