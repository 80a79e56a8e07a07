//! Core entity/component storage benchmarks.
//!
//! Run with: `cargo bench --bench ecs_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use nomai_ecs::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Position {
    x: f64,
    y: f64,
}
impl Component for Position {
    const IDENTIFIER: Identifier = Identifier::from_u128(0xB001);
}

#[derive(Debug, Clone, PartialEq)]
struct Health(u32);
impl Component for Health {
    const IDENTIFIER: Identifier = Identifier::from_u128(0xB002);
}

#[derive(Debug, Clone, PartialEq)]
struct Velocity {
    dx: f64,
    dy: f64,
}
impl Component for Velocity {
    const IDENTIFIER: Identifier = Identifier::from_u128(0xB003);
}

fn setup_engine(entity_count: usize) -> (Engine, Vec<Entity>) {
    let mut engine = Engine::new();
    engine.register::<Position>();
    engine.register::<Health>();
    engine.register::<Velocity>();

    let entities = engine.spawn_batch(entity_count as u32, |i, registry| {
        let mut bundle = ComponentBundle::new();
        bundle.add(registry, Position { x: i as f64, y: 0.0 }).unwrap();
        bundle.add(registry, Health(100)).unwrap();
        bundle.add(registry, Velocity { dx: 1.0, dy: 0.0 }).unwrap();
        bundle
    });

    (engine, entities)
}

// ---------------------------------------------------------------------------
// Benchmark 1: spawn throughput
// ---------------------------------------------------------------------------

fn bench_spawn_1k(c: &mut Criterion) {
    c.bench_function("spawn_1k_entities", |b| {
        b.iter(|| {
            let (engine, entities) = setup_engine(1_000);
            black_box((engine, entities));
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark 2: despawn throughput
// ---------------------------------------------------------------------------

fn bench_despawn_1k(c: &mut Criterion) {
    c.bench_function("despawn_1k_entities", |b| {
        b.iter_batched(
            || setup_engine(1_000),
            |(mut engine, entities)| {
                for e in entities {
                    black_box(engine.despawn(e).unwrap());
                }
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

// ---------------------------------------------------------------------------
// Benchmark 3: component insert/remove migration
// ---------------------------------------------------------------------------

fn bench_insert_remove_migration(c: &mut Criterion) {
    let (mut engine, entities) = setup_engine(1_000);

    c.bench_function("insert_remove_migration_1k", |b| {
        b.iter(|| {
            for &e in &entities {
                engine.remove_component::<Velocity>(e).unwrap();
            }
            for &e in &entities {
                engine
                    .insert_component(e, Velocity { dx: 2.0, dy: -2.0 })
                    .unwrap();
            }
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark 4: random component reads
// ---------------------------------------------------------------------------

fn bench_get_component(c: &mut Criterion) {
    let (engine, entities) = setup_engine(10_000);

    c.bench_function("get_component_10k_reads", |b| {
        b.iter(|| {
            for &e in &entities {
                black_box(engine.get_component::<Position>(e));
            }
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark 5: scaling -- spawn cost at various entity counts
// ---------------------------------------------------------------------------

fn bench_spawn_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn_scaling");

    for &count in &[100usize, 1_000, 10_000, 50_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let (engine, entities) = setup_engine(count);
                black_box((engine, entities));
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark 6: reserve + flush (concurrent spawn path) throughput
// ---------------------------------------------------------------------------

fn bench_reserve_and_flush(c: &mut Criterion) {
    c.bench_function("reserve_and_flush_10k", |b| {
        b.iter_batched(
            EntityAllocator::new,
            |allocator| {
                let mut allocator = allocator;
                allocator.reserve_many(10_000);
                let entities = allocator.flush();
                black_box(entities);
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    bench_spawn_1k,
    bench_despawn_1k,
    bench_insert_remove_migration,
    bench_get_component,
    bench_spawn_scaling,
    bench_reserve_and_flush,
);
criterion_main!(benches);
