use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use resource_query::lexer::Lexer;
use resource_query::metadata::{EntityDescriptor, MetadataStore};
use resource_query::parser::{parse_filter, Parser};
use resource_query::sql_compiler::{QueryEngine, QueryRequest, SortKey};
use resource_query::{Dialect, FieldType};

fn bench_store() -> MetadataStore {
    MetadataStore::new(vec![
        EntityDescriptor::build("book")
            .attribute("id", FieldType::Int)
            .attribute("title", FieldType::String)
            .attribute("genre", FieldType::String)
            .formula(
                "chapterCount",
                FieldType::Int,
                "(SELECT COUNT(*) FROM book_chapter bc WHERE bc.book_id = {{id}})",
            )
            .relationship("publisher", "publisher")
            .finish(),
        EntityDescriptor::build("publisher")
            .attribute("id", FieldType::Int)
            .attribute("name", FieldType::String)
            .relationship("editor", "editor")
            .finish(),
        EntityDescriptor::build("editor")
            .attribute("id", FieldType::Int)
            .attribute("name", FieldType::String)
            .finish(),
    ])
    .expect("bench store must build")
}

const CASES: [(&str, &str); 3] = [
    ("simple", "title=='Dune'"),
    (
        "medium",
        "title=='Dune*';(genre=='SciFi',genre=='Fantasy');chapterCount=ge=10",
    ),
    (
        "complex",
        "publisher.editor.name=='Herbert';publisher.name=in=('Chilton','Ace');\
         (genre=='SciFi',genre=='Fantasy');title!='*draft*'",
    ),
];

fn benchmark_lexer(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer_performance");
    for (name, filter) in CASES {
        group.bench_with_input(BenchmarkId::new("tokenize", name), &filter, |b, &filter| {
            b.iter(|| {
                let tokens: Vec<_> = Lexer::new(black_box(filter)).collect();
                black_box(tokens)
            })
        });
    }
    group.finish();
}

fn benchmark_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_performance");
    for (name, filter) in CASES {
        let tokens: Vec<_> = Lexer::new(filter).collect();
        group.bench_with_input(BenchmarkId::new("parse", name), &tokens, |b, tokens| {
            b.iter(|| {
                let mut parser = Parser::new(black_box(tokens));
                black_box(parser.parse().expect("bench filter must parse"))
            })
        });
    }
    group.finish();
}

fn benchmark_compile(c: &mut Criterion) {
    let store = bench_store();
    let engine = QueryEngine::new(&store, Dialect::Postgres);
    let mut group = c.benchmark_group("sql_compiler_performance");
    for (name, filter) in CASES {
        let ast = parse_filter(filter).expect("bench filter must parse");
        let request = QueryRequest {
            filter: Some(store.resolve_filter("book", &ast).expect("must resolve")),
            sort: vec![SortKey::asc("title")],
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::new("compile", name), &request, |b, request| {
            b.iter(|| black_box(engine.compile("book", black_box(request)).expect("must compile")))
        });
    }
    group.finish();
}

fn benchmark_end_to_end(c: &mut Criterion) {
    let store = bench_store();
    let engine = QueryEngine::new(&store, Dialect::Postgres);
    let mut group = c.benchmark_group("end_to_end_performance");
    for (name, filter) in CASES {
        group.bench_with_input(BenchmarkId::new("full_pipeline", name), &filter, |b, &filter| {
            b.iter(|| {
                let ast = parse_filter(black_box(filter)).expect("bench filter must parse");
                let request = QueryRequest {
                    filter: Some(store.resolve_filter("book", &ast).expect("must resolve")),
                    ..Default::default()
                };
                black_box(engine.compile("book", &request).expect("must compile"))
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_lexer,
    benchmark_parser,
    benchmark_compile,
    benchmark_end_to_end
);
criterion_main!(benches);
