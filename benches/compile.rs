//! End-to-end compile latency: lex + parse + semantic walk + emission.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

const SMALL: &str = "Program P;\nvar a: integer;\nbegin a:=1; end.";

const MEDIUM: &str = "Program Demo;\n\
                      var total, i: integer;\n\
                      g: array [1..100] of integer;\n\
                      procedure bump(amount: integer);\n\
                      var next: integer;\n\
                      begin next:=amount+1; end;\n\
                      begin\n\
                      total:=0;\n\
                      while (total < 100) do begin\n\
                      total:=total+1;\n\
                      if (total >= 50) then bump(total); else WriteLn(total);\n\
                      end;\n\
                      g[7]:=total;\n\
                      end.";

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.bench_function("small", |b| {
        b.iter(|| pascaline::parse(black_box(SMALL)).unwrap())
    });
    group.bench_function("medium", |b| {
        b.iter(|| pascaline::parse(black_box(MEDIUM)).unwrap())
    });
    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    group.bench_function("small", |b| {
        b.iter(|| pascaline::compile_silent(black_box(SMALL)).unwrap())
    });
    group.bench_function("medium", |b| {
        b.iter(|| pascaline::compile_silent(black_box(MEDIUM)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_parse, bench_compile);
criterion_main!(benches);
