//! Benchmarks for the output naming pipeline
//!
//! Measures block concatenation and sanitizing for typical templates.

use aether::engine::naming::{apply_naming_pipeline, sanitize_filename};
use aether::settings::{BlockKind, NamingBlock, NamingConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const STEMS: &[(&str, &str)] = &[
    ("short", "clip"),
    ("spaces", "Summer Holiday 2024 - Day 3 (Beach)"),
    ("unicode", "Café Résumé – naïve façade ünïcödé"),
    (
        "long",
        "My.Movie.2024.2160p.UHD.BluRay.x265-GROUP.with.a.very.long.release.name.that.keeps.going",
    ),
];

fn config(kinds: Vec<BlockKind>, sanitize: bool) -> NamingConfig {
    NamingConfig {
        blocks: kinds.into_iter().map(NamingBlock::new).collect(),
        sanitize_enabled: sanitize,
    }
}

fn bench_templates(c: &mut Criterion) {
    let mut group = c.benchmark_group("naming_templates");

    let templates = [
        ("original", config(vec![BlockKind::Original], false)),
        (
            "prefix_original",
            config(
                vec![
                    BlockKind::Prefix {
                        value: "export".into(),
                    },
                    BlockKind::Original,
                ],
                false,
            ),
        ),
        (
            "all_blocks_sanitized",
            config(
                vec![
                    BlockKind::Prefix {
                        value: "Export Batch".into(),
                    },
                    BlockKind::Original,
                    BlockKind::Random { length: 8 },
                    BlockKind::Date,
                ],
                true,
            ),
        ),
    ];

    for (name, template) in &templates {
        group.bench_with_input(BenchmarkId::from_parameter(name), template, |b, template| {
            b.iter(|| apply_naming_pipeline(black_box("Summer Holiday 2024"), black_box(template)))
        });
    }

    group.finish();
}

fn bench_sanitize(c: &mut Criterion) {
    let mut group = c.benchmark_group("sanitize_filename");

    for (name, stem) in STEMS {
        group.bench_with_input(BenchmarkId::from_parameter(name), stem, |b, stem| {
            b.iter(|| sanitize_filename(black_box(stem)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_templates, bench_sanitize);
criterion_main!(benches);
