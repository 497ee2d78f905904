#![no_main]
use furrow_core::test_utils::test_config;
use furrow_core::world::WorldStore;
use furrow_net::message::FarmMessage;
use furrow_net::replicate::apply_delta;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(mut world) = WorldStore::new(&test_config()) else {
        return;
    };
    // A stream of length-prefixed messages applied in order.
    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let len = (len as usize).min(tail.len());
        let (frame, next) = tail.split_at(len);
        rest = next;
        if let Ok(message) = FarmMessage::decode(frame) {
            let _ = apply_delta(&mut world, &message);
        }
    }
    for chunk in world.non_empty_chunks() {
        for slot in chunk.slots() {
            assert!(!slot.is_empty(), "empty slot kept at {}", slot.pos());
            assert!(slot.is_consistent(), "crop and structure share {}", slot.pos());
        }
    }
});
