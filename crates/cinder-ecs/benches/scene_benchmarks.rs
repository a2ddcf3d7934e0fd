//! Scene benchmarks: entity creation, archetype migration, query iteration
//! and hierarchy propagation.
//!
//! Entity mixes are drawn from a seeded `Pcg64` so every run measures the same
//! workload.
//!
//! Run with: `cargo bench --bench scene_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use cinder_ecs::prelude::*;

// ---------------------------------------------------------------------------
// Benchmark component types
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck_derive::Pod, bytemuck_derive::Zeroable)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck_derive::Pod, bytemuck_derive::Zeroable)]
struct Health(u32);

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck_derive::Pod, bytemuck_derive::Zeroable)]
struct Mesh(ResourceId);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SEED: u64 = 0x5eed_c1de;

struct Kinds {
    velocity: ComponentKind,
    health: ComponentKind,
    mesh: ComponentKind,
}

fn new_scene() -> (Scene, Kinds) {
    let mut table = KindTable::new();
    let kinds = Kinds {
        velocity: table.register::<Velocity>("velocity"),
        health: table.register::<Health>("health"),
        mesh: table.register::<Mesh>("mesh"),
    };
    (Scene::new(table), kinds)
}

/// A random non-empty archetype that always contains a transform.
fn random_archetype(rng: &mut Pcg64, kinds: &Kinds) -> Archetype {
    let mut arch = Archetype::of(ComponentKind::TRANSFORM);
    for kind in [kinds.velocity, kinds.health, kinds.mesh] {
        if rng.gen_bool(0.5) {
            arch = arch | kind;
        }
    }
    arch
}

fn populated_scene(count: usize) -> (Scene, Kinds, Vec<Entity>) {
    let (mut scene, kinds) = new_scene();
    let mut rng = Pcg64::seed_from_u64(SEED);
    let entities = (0..count)
        .map(|_| {
            let arch = random_archetype(&mut rng, &kinds);
            scene.entity_new(arch)
        })
        .collect();
    (scene, kinds, entities)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_entity_new(c: &mut Criterion) {
    let mut group = c.benchmark_group("entity_new");
    for count in [1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let (scene, _, entities) = populated_scene(count);
                black_box((scene.entity_count(), entities.len()))
            });
        });
    }
    group.finish();
}

fn bench_migration(c: &mut Criterion) {
    c.bench_function("add_remove_component_1k", |b| {
        b.iter_batched(
            || populated_scene(1_000),
            |(mut scene, kinds, entities)| {
                for &e in &entities {
                    if scene.has_components(e, Archetype::of(kinds.health)) {
                        scene.entity_remove_components(e, Archetype::of(kinds.health));
                    } else {
                        scene.entity_add_component(e, Archetype::of(kinds.health));
                    }
                }
                black_box(scene.pool_count())
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_query(c: &mut Criterion) {
    let (mut scene, kinds, _) = populated_scene(10_000);
    let mask = ComponentKind::TRANSFORM | kinds.velocity;

    c.bench_function("query_cursor_10k", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            let mut cursor = scene.iter_begin(mask);
            while cursor.is_valid() {
                sum += scene.iter_get::<Velocity>(&cursor).x;
                scene.iter_next(&mut cursor);
            }
            black_box(sum)
        });
    });

    c.bench_function("query_for_each_mut_10k", |b| {
        b.iter(|| {
            scene.query_for_each_mut(mask, |mut row| {
                let v = *row.get::<Velocity>();
                let t = row.get_mut::<Transform>();
                t.translation.x += v.x;
            });
        });
    });
}

fn bench_hierarchy(c: &mut Criterion) {
    let (mut scene, _) = new_scene();
    let t = Archetype::of(ComponentKind::TRANSFORM);
    let mut rng = Pcg64::seed_from_u64(SEED);
    let root = scene.entity_new(t);
    let mut nodes = vec![root];
    for _ in 0..5_000 {
        let parent = nodes[rng.gen_range(0..nodes.len())];
        let child = scene.spawn_child(parent, t);
        scene.component_get_mut::<Transform>(child).translation.x = rng.gen_range(-1.0..1.0);
        nodes.push(child);
    }

    c.bench_function("update_hierarchy_5k", |b| {
        b.iter(|| scene.update_hierarchy(black_box(root)));
    });
}

criterion_group!(
    benches,
    bench_entity_new,
    bench_migration,
    bench_query,
    bench_hierarchy
);
criterion_main!(benches);
