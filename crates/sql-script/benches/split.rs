//! Splitter and analysis throughput on generated scripts.

use std::collections::HashSet;
use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sql_script::{analyze, split_statements};

fn build_script(statements: usize) -> String {
    let mut script = String::new();
    for i in 0..statements {
        match i % 4 {
            0 => script.push_str(&format!("-- step {i}\nCREATE TABLE t{i} (id INT, name VARCHAR);\n")),
            1 => script.push_str(&format!("INSERT INTO t{} VALUES (1, 'a;b''c');\n", i - 1)),
            2 => script.push_str("/* report */ SELECT $$ raw; text $$, \"col;x\" FROM t;\n"),
            _ => script.push_str("SELECT '😀 emoji', 'naïve' FROM range(10);\n"),
        }
    }
    script
}

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_statements");

    for size in [10, 100, 1000] {
        let script = build_script(size);
        group.throughput(Throughput::Bytes(script.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &script, |b, script| {
            b.iter(|| black_box(split_statements(black_box(script))));
        });
    }

    group.finish();
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    let protected: HashSet<String> = ["t0".to_string(), "audit".to_string()].into();

    for size in [10, 100, 1000] {
        let script = build_script(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &script, |b, script| {
            b.iter(|| black_box(analyze(black_box(script), &protected)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_split, bench_analyze);
criterion_main!(benches);
