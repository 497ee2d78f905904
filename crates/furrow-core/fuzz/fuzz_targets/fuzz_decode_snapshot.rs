#![no_main]
use furrow_core::snapshot::WorldSnapshot;
use furrow_core::test_utils::test_config;
use furrow_core::world::WorldStore;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(snapshot) = WorldSnapshot::deserialize(data) else {
        return;
    };
    if let Ok(mut world) = WorldStore::new(&test_config()) {
        let _ = snapshot.restore(&mut world);
    }
});
