//! Criterion benchmarks for the Furrow tile store.
//!
//! Three benchmark groups:
//! - `chunk_codec`: encode/decode of a fully planted 30x30 chunk
//! - `snapshot`: capture and restore of a 6x6-chunk world
//! - `growth`: one authority growth pass over every crop in that world

use criterion::{Criterion, criterion_group, criterion_main};
use furrow_core::chunk::Chunk;
use furrow_core::codec::{decode_chunk, encode_chunk};
use furrow_core::coord::{ChunkCoord, TilePos};
use furrow_core::growth::GrowthScheduler;
use furrow_core::id::SectionId;
use furrow_core::snapshot::WorldSnapshot;
use furrow_core::test_utils::*;
use furrow_core::world::WorldStore;

// ===========================================================================
// Builders
// ===========================================================================

/// A 30x30 chunk with a crop on every other tile and tilled soil elsewhere.
fn build_planted_chunk() -> Chunk {
    let mut chunk = Chunk::new(ChunkCoord::new(2, -1), SectionId(1), 30);
    let origin = chunk.coord().world_origin(30);
    for dy in 0..30 {
        for dx in 0..30 {
            let pos = TilePos::new(origin.x + dx, origin.y + dy);
            let _ = chunk.till_tile(pos);
            if (dx + dy) % 2 == 0 {
                let _ = chunk.plant_crop(pos, &turnip());
            }
        }
    }
    chunk
}

/// 6x6 chunks of 30 tiles with a planted row through every chunk.
fn build_farm_world() -> WorldStore {
    let mut world = match WorldStore::new(&grid_config(30, 6, 6)) {
        Ok(world) => world,
        Err(e) => panic!("bench config is invalid: {e}"),
    };
    for cy in 0..6 {
        for x in 0..180 {
            let pos = TilePos::new(x, cy * 30 + 15);
            let _ = world.till_tile(pos);
            let _ = world.plant_crop(pos, if x % 2 == 0 { &turnip() } else { &carrot() });
        }
    }
    world
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_chunk_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_codec");
    group.sample_size(50);

    let chunk = build_planted_chunk();
    let encoded = encode_chunk(&chunk).unwrap();

    group.bench_function("encode_900_slots", |b| {
        b.iter(|| encode_chunk(&chunk).unwrap());
    });

    group.bench_function("decode_900_slots", |b| {
        b.iter(|| decode_chunk(&encoded).unwrap());
    });

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    group.sample_size(30);

    let world = build_farm_world();
    let snapshot = WorldSnapshot::capture(&world, 1).unwrap();

    group.bench_function("capture_36_chunks", |b| {
        b.iter(|| WorldSnapshot::capture(&world, 1).unwrap());
    });

    group.bench_function("restore_36_chunks", |b| {
        b.iter_batched(
            || WorldStore::new(&grid_config(30, 6, 6)).unwrap(),
            |mut target| snapshot.restore(&mut target).unwrap(),
            criterion::BatchSize::LargeInput,
        );
    });

    group.bench_function("state_hash_36_chunks", |b| {
        b.iter(|| world.state_hash());
    });

    group.finish();
}

fn bench_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("growth");
    group.sample_size(30);

    let catalog = test_catalog();

    group.bench_function("growth_pass_1080_crops", |b| {
        b.iter_batched(
            build_farm_world,
            |mut world| {
                let mut growth = GrowthScheduler::new();
                growth.on_day_changed(1, true, &mut world, &catalog)
            },
            criterion::BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_chunk_codec, bench_snapshot, bench_growth);
criterion_main!(benches);
