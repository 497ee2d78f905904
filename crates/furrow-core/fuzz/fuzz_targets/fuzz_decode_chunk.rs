#![no_main]
use furrow_core::codec::decode_chunk;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Must not panic -- returning Err is fine.
    let _ = decode_chunk(data);
});
