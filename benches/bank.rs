//! Benchmarks for the memory bank core over a synthetic bank.
//!
//! Run with: `cargo bench --bench bank`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

use memory_bank::tokens::HeuristicTokenCounter;
use memory_bank::{
    BankConfig, CandidateGranularity, Document, MemoryBank, Strategy, TransclusionResolver,
};

/// Builds `size` documents where each links to a few earlier ones and
/// includes a section of its predecessor.
fn synthetic_documents(size: usize) -> Vec<Document> {
    let counter = HeuristicTokenCounter::default();
    (0..size)
        .map(|i| {
            let mut content = format!("# Document {}\n\n## Summary\nTopic {} covers caching, parsing and graphs.\n", i, i);
            for offset in [1, 3, 7] {
                if i >= offset {
                    content.push_str(&format!("See [doc {}](doc{}.md).\n", i - offset, i - offset));
                }
            }
            if i > 0 {
                content.push_str(&format!("\n## Inherited\n{{{{include:doc{}.md#Summary}}}}\n", i - 1));
            }
            Document::new(format!("doc{}.md", i), content, &counter)
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(50);
    group.measurement_time(Duration::from_secs(5));

    for size in [50, 200] {
        let docs = synthetic_documents(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &docs, |b, docs| {
            b.iter(|| {
                let bank = MemoryBank::from_documents(docs.clone(), BankConfig::default()).unwrap();
                black_box(bank.graph().edge_count())
            })
        });
    }

    group.finish();
}

fn bench_loading_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("loading_order");

    for size in [50, 200] {
        let bank = MemoryBank::from_documents(synthetic_documents(size), BankConfig::default()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &bank, |b, bank| {
            b.iter(|| black_box(bank.loading_order(&[]).unwrap()))
        });
    }

    group.finish();
}

fn bench_transclusion(c: &mut Criterion) {
    let mut group = c.benchmark_group("transclusion");
    let docs = memory_bank::DocumentSet::from_documents(synthetic_documents(200));

    group.bench_function("uncached", |b| {
        b.iter(|| {
            let mut resolver = TransclusionResolver::new();
            black_box(resolver.resolve_document(&docs, "doc199.md", 5).unwrap())
        })
    });

    let mut resolver = TransclusionResolver::new();
    group.bench_function("cached", |b| {
        b.iter(|| black_box(resolver.resolve_document(&docs, "doc199.md", 5).unwrap()))
    });

    group.finish();
}

fn bench_optimize(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize");
    group.sample_size(50);
    let bank = MemoryBank::from_documents(synthetic_documents(200), BankConfig::default()).unwrap();

    for strategy in [Strategy::Priority, Strategy::Dependency, Strategy::Hybrid] {
        group.bench_with_input(
            BenchmarkId::from_parameter(strategy),
            &strategy,
            |b, &strategy| {
                b.iter(|| {
                    black_box(
                        bank.optimize(
                            "caching graphs topic 42",
                            4000,
                            strategy,
                            CandidateGranularity::Section,
                        )
                        .unwrap(),
                    )
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_build,
    bench_loading_order,
    bench_transclusion,
    bench_optimize
);
criterion_main!(benches);
