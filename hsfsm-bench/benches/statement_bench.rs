//! Statement building and rendering benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hsfsm_core::{Dialect, EntityId, Layout, State, StatementBuilder, TransitionRule};

fn rule_with_sources(n: usize) -> TransitionRule {
    TransitionRule::new("Go", (0..n).map(|i| format!("state_{}", i)), "done")
}

fn bench_build_transition(c: &mut Criterion) {
    let mut group = c.benchmark_group("statement_build_transition");
    let builder = StatementBuilder::new(Layout::new("task", "state").unwrap());
    let id = EntityId::from("i-12345");
    let initial = State::from("state_0");

    for sources in [1, 4, 16] {
        let rule = rule_with_sources(sources);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(sources), &rule, |b, rule| {
            b.iter(|| black_box(builder.transition(&id, rule, &initial)));
        });
    }

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("statement_render");
    let builder = StatementBuilder::new(Layout::new("task", "state").unwrap());
    let id = EntityId::from("i-12345");
    let initial = State::from("state_0");
    let stmt = builder.transition(&id, &rule_with_sources(4), &initial);

    for dialect in [Dialect::MySql, Dialect::Sqlite, Dialect::Postgres] {
        group.bench_with_input(
            BenchmarkId::from_parameter(dialect),
            &dialect,
            |b, &dialect| {
                b.iter(|| black_box(stmt.render(dialect)));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_build_transition, bench_render);
criterion_main!(benches);
