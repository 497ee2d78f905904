#![no_main]
use arbitrary::Arbitrary;
use furrow_core::codec::{decode_chunk, encode_chunk};
use furrow_core::coord::TilePos;
use furrow_core::test_utils::*;
use furrow_core::world::WorldStore;
use libfuzzer_sys::fuzz_target;

/// A structured tile mutation for fuzzing.
#[derive(Arbitrary, Debug)]
enum FuzzOp {
    Till { x: i8, y: i8 },
    Untill { x: i8, y: i8 },
    Plant { x: i8, y: i8, carrot: bool },
    RemoveCrop { x: i8, y: i8 },
    Stage { x: i8, y: i8, stage: u8 },
    Place { x: i8, y: i8 },
    RemoveStructure { x: i8, y: i8 },
    HarvestPollen { x: i8, y: i8 },
    Crossbreed { x: i8, y: i8, dx: i8, dy: i8 },
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    ops: Vec<FuzzOp>,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(mut world) = WorldStore::new(&test_config()) else {
        return;
    };
    let catalog = test_catalog();
    let at = |x: i8, y: i8| TilePos::new(x as i32, y as i32);

    // Limit operations to prevent timeouts.
    let max_ops = input.ops.len().min(256);

    for op in &input.ops[..max_ops] {
        let _ = match *op {
            FuzzOp::Till { x, y } => world.till_tile(at(x, y)),
            FuzzOp::Untill { x, y } => world.untill_tile(at(x, y)),
            FuzzOp::Plant { x, y, carrot: c } => {
                let plant = if c { carrot() } else { turnip() };
                world.plant_crop(at(x, y), &plant).map(|_| ())
            }
            FuzzOp::RemoveCrop { x, y } => world.remove_crop(at(x, y)).map(|_| ()),
            FuzzOp::Stage { x, y, stage } => world.update_crop_stage(at(x, y), stage).map(|_| ()),
            FuzzOp::Place { x, y } => world.place_structure(at(x, y), &fence(), 0).map(|_| ()),
            FuzzOp::RemoveStructure { x, y } => world.remove_structure(at(x, y)).map(|_| ()),
            FuzzOp::HarvestPollen { x, y } => world.harvest_pollen(at(x, y), &catalog).map(|_| ()),
            FuzzOp::Crossbreed { x, y, dx, dy } => world
                .crossbreed(at(x, y), at(dx, dy), &catalog)
                .map(|_| ()),
        };
    }

    for chunk in world.non_empty_chunks() {
        for slot in chunk.slots() {
            assert!(slot.is_consistent());
            assert!(!slot.is_empty());
        }
        let bytes = encode_chunk(chunk).unwrap();
        let decoded = decode_chunk(&bytes).unwrap();
        assert_eq!(decoded.slots.len(), chunk.slot_count());
    }
});
