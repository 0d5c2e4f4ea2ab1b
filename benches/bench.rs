//! Criterion benchmarks for Termsift.
//!
//! Covers the hot paths of the engine:
//! - Query compilation (parse and precedence merge)
//! - Index maintenance on object writes
//! - Evaluation of boolean and phrase queries over paged posting lists

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;
use termsift::prelude::*;
use termsift::query::QueryParser;
use tokio::runtime::Runtime;

const WORDS: [&str; 24] = [
    "search", "engine", "index", "query", "term", "phrase", "boolean", "posting", "range", "key",
    "table", "column", "value", "union", "difference", "intersection", "cursor", "page", "store",
    "cache", "token", "position", "object", "schema",
];

/// Generate pseudo-random texts of varying length.
fn generate_texts(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let length = 8 + (i % 24);
            (0..length)
                .map(|j| WORDS[(i * 7 + j * 13) % WORDS.len()])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn schema() -> Schema {
    Schema::builder("docs")
        .indexed("body", TextCapability::new())
        .indexed("tag", KeywordCapability::new())
        .build()
        .unwrap()
}

async fn populated_engine(count: usize, page_size: usize) -> QueryEngine {
    let config = EngineConfig::default().with_page_size(page_size);
    let engine = QueryEngine::new(Arc::new(MemoryStore::new()), config).unwrap();
    engine.register_schema(schema());

    for (i, text) in generate_texts(count).into_iter().enumerate() {
        let tag = WORDS[i % 5];
        engine
            .write(
                "docs",
                &ObjectKey::new(format!("doc{i:06}")),
                vec![
                    ("body".to_string(), ColumnUpdate::Set(json!(text))),
                    ("tag".to_string(), ColumnUpdate::Set(json!(tag))),
                ],
                &WriteOptions::default(),
            )
            .await
            .unwrap();
    }
    engine
}

/// Benchmark query compilation.
fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let parser = QueryParser::new(Arc::new(schema()));

    group.bench_function("single_term", |b| {
        b.iter(|| black_box(parser.parse(black_box("docs.tag=search")).unwrap()))
    });

    let query = r#"docs.tag=search | docs.tag={t} - docs.body="query _ term" & (docs.tag=index | docs.body=cache)"#;
    group.bench_function("mixed_operators", |b| {
        b.iter(|| black_box(parser.parse(black_box(query)).unwrap()))
    });

    group.finish();
}

/// Benchmark index maintenance.
fn bench_indexing(c: &mut Criterion) {
    let mut group = c.benchmark_group("indexing");
    let runtime = Runtime::new().unwrap();
    let texts = generate_texts(100);
    let schema = schema();

    group.throughput(Throughput::Elements(texts.len() as u64));
    group.bench_function("write_100_objects", |b| {
        b.to_async(&runtime).iter(|| async {
            let indexer = TermIndexer::new(Arc::new(MemoryStore::new()));
            for (i, text) in texts.iter().enumerate() {
                let summary = indexer
                    .write(
                        &schema,
                        &ObjectKey::new(format!("doc{i:06}")),
                        vec![("body".to_string(), ColumnUpdate::Set(json!(text)))],
                        &WriteOptions::default(),
                    )
                    .await
                    .unwrap();
                black_box(summary);
            }
        })
    });

    group.finish();
}

/// Benchmark query evaluation at different posting page sizes.
fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    let runtime = Runtime::new().unwrap();

    let queries = [
        ("union", "docs.tag=search | docs.tag=engine"),
        ("intersection", "docs.body=query & docs.body=cache"),
        ("difference", "docs.body=term - docs.tag=index"),
        ("phrase", r#"docs.body="query _ term""#),
    ];

    for page_size in [16, 256] {
        let engine = runtime.block_on(populated_engine(2000, page_size));
        for (name, query) in queries {
            group.bench_function(format!("{name}/page_size_{page_size}"), |b| {
                b.to_async(&runtime).iter(|| async {
                    let page = engine
                        .try_query("docs", black_box(query), QueryOptions::new())
                        .await
                        .unwrap();
                    black_box(page)
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_indexing, bench_evaluate);

criterion_main!(benches);
