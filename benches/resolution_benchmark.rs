use std::hint::black_box;

use deepkeys::{Completion, ExprId, Program, Source};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn program(src: &str) -> Program {
    let source = Source::from_contents("bench.php".to_string(), src.to_string()).unwrap();
    Program::from_sources(&[source]).unwrap()
}

fn last_expr(program: &Program, src: &str, needle: &str) -> ExprId {
    let offset = src.rfind(needle).unwrap();
    program.expr_at(0, offset as u32).unwrap()
}

/// `$row` built from `n` keyed assignments spread over helper functions.
fn wide_shape(n: usize) -> String {
    let mut src = String::from("<?php\n$row = [];\n");
    for i in 0..n {
        src.push_str(&format!(
            "function part{i}($base) {{ return $base + ['key{i}' => {i}]; }}\n$row = part{i}($row);\n"
        ));
    }
    src.push_str("$row;\n");
    src
}

fn resolve_literal_keys(c: &mut Criterion) {
    c.bench_function("literal keys", |b| {
        let src = "<?php\n$x = ['id' => 1, 'name' => 'Bob', 'tags' => ['a', 'b']];\n$x;\n";
        let program = program(src);
        let expr = last_expr(&program, src, "$x;");

        b.iter(|| {
            let mut completion = Completion::explicit(&program);
            black_box(completion.key_completions(black_box(expr)))
        })
    });
}

fn resolve_wide_shapes(c: &mut Criterion) {
    let mut group = c.benchmark_group("keys through function chains");
    for n in [4usize, 16, 32] {
        let src = wide_shape(n);
        let program = program(&src);
        let expr = last_expr(&program, &src, "$row;");
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let mut completion = Completion::explicit(&program);
                black_box(completion.list_key_names(black_box(expr)))
            })
        });
    }
    group.finish();
}

fn resolve_usage(c: &mut Criterion) {
    c.bench_function("keys from usage", |b| {
        let src = "<?php\nfunction show($p) {\n    echo $p['title'], $p['body'], $p['author']['name'];\n}\nshow($page);\n";
        let program = program(src);
        let expr = last_expr(&program, src, "$page");

        b.iter(|| {
            let mut completion = Completion::auto_popup(&program);
            let types = completion.resolve(black_box(expr));
            black_box(completion.to_debug_json(&types, 0))
        })
    });
}

criterion_group!(
    benches,
    resolve_literal_keys,
    resolve_wide_shapes,
    resolve_usage
);
criterion_main!(benches);
