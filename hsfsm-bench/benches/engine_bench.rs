//! Engine benchmarks against the in-memory store.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use hsfsm_core::{Engine, EntityId, Layout, TransitionRule, TransitionTable};
use hsfsm_storage::MemoryStore;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn create_test_engine() -> Arc<Engine<Arc<MemoryStore>>> {
    let table = TransitionTable::build(
        "created",
        vec![
            TransitionRule::new("START", ["created", "failed"], "processing"),
            TransitionRule::new("COMPLETE", ["processing"], "completed"),
            TransitionRule::new("FAIL", ["processing"], "failed"),
            TransitionRule::new("RESET", ["completed", "failed"], "created"),
        ],
    )
    .unwrap();
    Arc::new(Engine::new(
        Arc::new(table),
        Layout::new("benchmark", "state").unwrap(),
        Arc::new(MemoryStore::new()),
    ))
}

fn new_id() -> EntityId {
    EntityId::new(uuid::Uuid::new_v4().to_string())
}

fn bench_initialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_initialize");
    let rt = Runtime::new().unwrap();
    let engine = create_test_engine();

    group.throughput(Throughput::Elements(1));
    group.bench_function("initialize", |b| {
        b.to_async(&rt).iter(|| {
            let engine = engine.clone();
            async move { black_box(engine.initialize(&new_id()).await.unwrap()) }
        });
    });

    group.finish();
}

fn bench_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_event");
    let rt = Runtime::new().unwrap();
    let engine = create_test_engine();
    let id = new_id();
    rt.block_on(engine.initialize(&id)).unwrap();

    group.throughput(Throughput::Elements(4));
    group.bench_function("cycle", |b| {
        b.to_async(&rt).iter(|| {
            let engine = engine.clone();
            let id = id.clone();
            async move {
                for event in ["START", "FAIL", "START", "COMPLETE"] {
                    engine.event(&id, event).await.unwrap();
                }
                engine.event(&id, "RESET").await.unwrap();
            }
        });
    });

    group.bench_function("noop", |b| {
        b.to_async(&rt).iter(|| {
            let engine = engine.clone();
            let id = id.clone();
            async move { black_box(engine.event(&id, "COMPLETE").await.unwrap()) }
        });
    });

    group.finish();
}

fn bench_contended_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_contended_event");
    let rt = Runtime::new().unwrap();
    let engine = create_test_engine();
    let id = new_id();
    rt.block_on(engine.initialize(&id)).unwrap();

    for callers in [8usize, 64] {
        group.throughput(Throughput::Elements(callers as u64));
        group.bench_function(format!("callers_{}", callers), |b| {
            b.to_async(&rt).iter(|| {
                let engine = engine.clone();
                let id = id.clone();
                async move {
                    let calls = (0..callers).map(|i| {
                        let event = if i % 2 == 0 { "START" } else { "FAIL" };
                        let engine = engine.clone();
                        let id = id.clone();
                        async move { engine.event(&id, event).await }
                    });
                    for result in futures::future::join_all(calls).await {
                        result.unwrap();
                    }
                }
            });
        });
    }

    group.finish();
}

fn bench_current(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_current");
    let rt = Runtime::new().unwrap();
    let engine = create_test_engine();
    let id = new_id();
    rt.block_on(engine.initialize(&id)).unwrap();

    group.bench_function("current", |b| {
        b.to_async(&rt).iter(|| {
            let engine = engine.clone();
            let id = id.clone();
            async move { black_box(engine.current(&id).await.unwrap()) }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_initialize,
    bench_event,
    bench_contended_event,
    bench_current
);
criterion_main!(benches);
